//! Outdated-instance classification.

use vmroll_model::{FleetSnapshot, Instance};

/// Returns true when the instance needs an update.
///
/// An instance is outdated when its reported launcher version differs from
/// the target, or when it carries a true pending-change condition and no
/// abort marker. Instances that are not live are never outdated.
pub fn is_outdated(instance: &Instance, target_version: &str) -> bool {
    if !instance.is_live() {
        return false;
    }
    is_version_outdated(instance, target_version) || requires_migration(instance)
}

/// Launcher version is known and differs from the target.
pub fn is_version_outdated(instance: &Instance, target_version: &str) -> bool {
    instance
        .launcher_version
        .as_deref()
        .is_some_and(|version| version != target_version)
}

/// A pending in-place change needs a migration and nobody asked to abort it.
pub fn requires_migration(instance: &Instance) -> bool {
    !instance.abort_requested && instance.has_pending_change()
}

/// Outdated instances of one snapshot, split by migratability.
///
/// Both lists are in `(namespace, name)` order.
#[derive(Debug, Default)]
pub struct Classification<'a> {
    pub migratable: Vec<&'a Instance>,
    pub non_migratable: Vec<&'a Instance>,
}

impl<'a> Classification<'a> {
    pub fn outdated_count(&self) -> usize {
        self.migratable.len() + self.non_migratable.len()
    }

    /// All outdated instances in `(namespace, name)` order.
    pub fn outdated(&self) -> impl Iterator<Item = &'a Instance> + '_ {
        let mut all: Vec<&'a Instance> = self
            .migratable
            .iter()
            .chain(self.non_migratable.iter())
            .copied()
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all.into_iter()
    }
}

/// Classify every instance in the snapshot against the target version.
pub fn classify<'a>(snapshot: &'a FleetSnapshot, target_version: &str) -> Classification<'a> {
    let mut classification = Classification::default();
    for instance in snapshot
        .instances()
        .filter(|i| is_outdated(i, target_version))
    {
        if instance.is_migratable() {
            classification.migratable.push(instance);
        } else {
            classification.non_migratable.push(instance);
        }
    }
    classification
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmroll_id::ObjectKey;
    use vmroll_model::{ConditionType, InstancePhase};

    const TARGET: &str = "v2";

    fn vmi(name: &str) -> Instance {
        Instance::running(ObjectKey::new("default", name), format!("uid-{name}"))
    }

    #[test]
    fn test_version_mismatch_is_outdated() {
        assert!(is_outdated(&vmi("a").with_launcher_version("v1"), TARGET));
        assert!(!is_outdated(&vmi("a").with_launcher_version(TARGET), TARGET));
    }

    #[test]
    fn test_unknown_version_is_not_outdated() {
        assert!(!is_outdated(&vmi("a"), TARGET));
    }

    #[test]
    fn test_pending_change_with_current_version_is_outdated() {
        let instance = vmi("a")
            .with_launcher_version(TARGET)
            .with_condition(ConditionType::MemoryChange, true);
        assert!(is_outdated(&instance, TARGET));
        assert!(requires_migration(&instance));
    }

    #[test]
    fn test_abort_marker_suppresses_pending_change() {
        let instance = vmi("a")
            .with_launcher_version(TARGET)
            .with_condition(ConditionType::CpuChange, true)
            .with_abort_requested();
        assert!(!is_outdated(&instance, TARGET));

        // Version still counts
        let instance = instance.with_launcher_version("v1");
        assert!(is_outdated(&instance, TARGET));
    }

    #[test]
    fn test_non_live_instances_ignored() {
        let mut instance = vmi("a").with_launcher_version("v1");
        instance.phase = InstancePhase::Failed;
        assert!(!is_outdated(&instance, TARGET));

        let mut instance = vmi("b").with_launcher_version("v1");
        instance.deleting = true;
        assert!(!is_outdated(&instance, TARGET));
    }

    #[test]
    fn test_classify_splits_by_migratability() {
        let snapshot = FleetSnapshot::from_parts(
            None,
            vec![
                vmi("c")
                    .with_launcher_version("v1")
                    .with_condition(ConditionType::LiveMigratable, true),
                vmi("b").with_launcher_version("v1"),
                vmi("a")
                    .with_launcher_version("v1")
                    .with_condition(ConditionType::LiveMigratable, false),
                vmi("d").with_launcher_version(TARGET),
            ],
            vec![],
            vec![],
        )
        .unwrap();

        let classification = classify(&snapshot, TARGET);
        assert_eq!(classification.outdated_count(), 3);
        assert_eq!(classification.migratable.len(), 1);

        let names: Vec<_> = classification
            .non_migratable
            .iter()
            .map(|i| i.key.name())
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let all: Vec<_> = classification.outdated().map(|i| i.key.name()).collect();
        assert_eq!(all, vec!["a", "b", "c"]);
    }
}
