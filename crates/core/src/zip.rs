//! Delivery ZIP allow-list.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Set of postal codes the bakery delivers to.
///
/// Entries and queries are both trimmed, so `" 97201 "` and `"97201"` are
/// the same code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ZipAllowList(BTreeSet<String>);

impl ZipAllowList {
    /// Build an allow-list, trimming each entry and dropping blanks.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            codes
                .into_iter()
                .map(|code| code.as_ref().trim().to_owned())
                .filter(|code| !code.is_empty())
                .collect(),
        )
    }

    /// Whether `zip` (after trimming) is in the list.
    #[must_use]
    pub fn is_deliverable(&self, zip: &str) -> bool {
        self.0.contains(zip.trim())
    }

    /// Number of codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty (nothing is deliverable).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate codes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for ZipAllowList {
    fn from(codes: Vec<String>) -> Self {
        Self::new(codes)
    }
}

impl From<ZipAllowList> for Vec<String> {
    fn from(list: ZipAllowList) -> Self {
        list.0.into_iter().collect()
    }
}

/// Free-function form of [`ZipAllowList::is_deliverable`].
#[must_use]
pub fn is_deliverable(zip: &str, allow_list: &ZipAllowList) -> bool {
    allow_list.is_deliverable(zip)
}
