//! Depot identifiers, decryption key sets and manifest references.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// File suffix identifying manifest files at any depth of a branch.
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Order numeric identifiers by value, before any non-numeric ones;
/// non-numeric identifiers order lexically among themselves.
fn numeric_then_lexical(a: &str, b: &str) -> Ordering {
    match (parse_numeric(a), parse_numeric(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Plain ASCII digits only; `u64::from_str` alone would also accept a sign.
fn parse_numeric(id: &str) -> Option<u64> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_numeric(&self) -> bool {
                parse_numeric(&self.0).is_some()
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                numeric_then_lexical(&self.0, &other.0)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

numeric_id!(
    /// Steam depot identifier. Usually numeric, but malformed names are kept.
    DepotId
);

numeric_id!(
    /// Manifest version identifier within a depot.
    ManifestId
);

/// Decryption keys by depot.
pub type KeySet = BTreeMap<DepotId, String>;

/// Manifest references in script order.
pub type ManifestSet = BTreeSet<ManifestRef>;

/// A manifest file discovered in a branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManifestRef {
    pub depot: DepotId,
    pub manifest: ManifestId,
    /// Path of the file relative to the branch root.
    pub path: String,
}

impl ManifestRef {
    /// Parse `{depot}_{manifest}.manifest` from the last path segment.
    ///
    /// Returns `None` when the name lacks the suffix or the `_` separator.
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let stem = strip_suffix_ignore_case(name, MANIFEST_SUFFIX)?;
        let (depot, manifest) = stem.split_once('_')?;
        if depot.is_empty() || manifest.is_empty() {
            return None;
        }

        Some(Self {
            depot: DepotId::new(depot),
            manifest: ManifestId::new(manifest),
            path: path.to_string(),
        })
    }
}

/// Whether a file name carries the manifest suffix, in any case.
pub fn is_manifest_name(name: &str) -> bool {
    strip_suffix_ignore_case(name, MANIFEST_SUFFIX).is_some()
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}
