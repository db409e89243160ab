//! Input alignment.
//!
//! Results are stored per (security, group key). Each input row finds its
//! result through the group it was assigned to, so duplicate tickers share
//! a value and securities the vendor never mentioned come back empty.

use std::collections::HashMap;

use crate::domain::overrides::{GroupKey, RequestGroup};
use crate::domain::security::SecurityId;

/// Results keyed by (security, group key).
#[derive(Debug, Clone)]
pub struct AlignedResults<T> {
    by_key: HashMap<(SecurityId, GroupKey), T>,
}

impl<T> Default for AlignedResults<T> {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
        }
    }
}

impl<T: Clone> AlignedResults<T> {
    /// Empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the result for a security within a group.
    ///
    /// The first result stored for a pair wins.
    pub fn insert(&mut self, security: SecurityId, key: GroupKey, value: T) {
        self.by_key.entry((security, key)).or_insert(value);
    }

    /// Mutable access to a pair's result, inserting the default if absent.
    pub fn entry_or_default(&mut self, security: SecurityId, key: GroupKey) -> &mut T
    where
        T: Default,
    {
        self.by_key.entry((security, key)).or_default()
    }

    /// Number of stored pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// One entry per input row, in input order.
    ///
    /// `securities` is the normalised input list the groups were built from.
    #[must_use]
    pub fn align(&self, securities: &[SecurityId], groups: &[RequestGroup]) -> Vec<Option<T>> {
        let mut row_keys: Vec<Option<&GroupKey>> = vec![None; securities.len()];
        for group in groups {
            for &row in &group.rows {
                if let Some(slot) = row_keys.get_mut(row) {
                    *slot = Some(&group.key);
                }
            }
        }

        securities
            .iter()
            .zip(row_keys)
            .map(|(security, key)| {
                key.and_then(|key| self.by_key.get(&(security.clone(), key.clone())))
                    .cloned()
            })
            .collect()
    }
}
