//! Macros for defining generated identifier types.

/// Macro to define a ULID-backed identifier with a fixed prefix.
///
/// The canonical form is `{prefix}-{ulid}` with the ULID rendered in lower
/// case, which keeps generated values valid as object names (RFC 1123
/// labels). Parsing accepts either case because Crockford base32 is case
/// insensitive. The prefix may itself contain dashes; the ULID is always the
/// final dash-separated segment.
///
/// The generated type parses with `parse()`/`FromStr`, renders with
/// `Display`, and serializes as its canonical string.
///
/// ```ignore
/// define_id!(PassId, "pass");
/// let parsed: PassId = "pass-01hv4z2wqxkjnm8gpqy6vbkc3d".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        /// A generated identifier of this kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Ulid);

        impl $name {
            /// Fixed prefix of the canonical form.
            pub const PREFIX: &'static str = $prefix;

            /// A fresh identifier stamped with the current time.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::Ulid::new())
            }

            /// Creation time encoded in the ULID, in milliseconds since the epoch.
            #[must_use]
            pub fn timestamp_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }

            /// Parses an ID from a string in the format `{prefix}-{ulid}`.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some((prefix, ulid_str)) = s.rsplit_once('-') else {
                    return Err($crate::IdError::MissingSeparator);
                };

                if prefix != Self::PREFIX {
                    return Err($crate::IdError::InvalidPrefix {
                        expected: Self::PREFIX,
                        actual: prefix.to_string(),
                    });
                }

                let ulid = ulid_str
                    .to_ascii_uppercase()
                    .parse::<$crate::Ulid>()
                    .map_err(|e| $crate::IdError::InvalidUlid(e.to_string()))?;

                Ok(Self(ulid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "{}-{}",
                    Self::PREFIX,
                    self.0.to_string().to_ascii_lowercase()
                )
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
