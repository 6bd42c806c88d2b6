use crate::error::DatabaseError;
use fxhash::FxHashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeSet;

/// Reverse index from a target (`document:acme/SPEC-A`) to the records pointing at it.
///
/// Callers that delete targets or rewrite a referrer's targets hold [`References::write`]
/// for the whole operation; the index lock is always taken before any row lock.
#[derive(Debug, Default)]
pub struct References {
    index: RwLock<ReferenceIndex>,
}

impl References {
    pub fn read(&self) -> RwLockReadGuard<'_, ReferenceIndex> {
        self.index.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ReferenceIndex> {
        self.index.write()
    }
}

#[derive(Debug, Default)]
pub struct ReferenceIndex {
    by_target: FxHashMap<String, BTreeSet<String>>,
    by_referrer: FxHashMap<String, BTreeSet<String>>,
}

impl ReferenceIndex {
    /// Replaces every target of `referrer`.
    pub fn set<I>(&mut self, referrer: &str, targets: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.clear_referrer(referrer);
        let targets: BTreeSet<String> = targets.into_iter().collect();
        if targets.is_empty() {
            return;
        }
        for target in &targets {
            self.by_target.entry(target.clone()).or_default().insert(referrer.to_owned());
        }
        self.by_referrer.insert(referrer.to_owned(), targets);
    }

    pub fn clear_referrer(&mut self, referrer: &str) {
        let Some(previous) = self.by_referrer.remove(referrer) else {
            return;
        };
        for target in previous {
            if let Some(referrers) = self.by_target.get_mut(&target) {
                referrers.remove(referrer);
                if referrers.is_empty() {
                    self.by_target.remove(&target);
                }
            }
        }
    }

    #[must_use]
    pub fn referrers(&self, target: &str) -> Vec<String> {
        self.by_target.get(target).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_referenced(&self, target: &str) -> bool {
        self.by_target.contains_key(target)
    }

    /// # Errors
    /// [`DatabaseError::Constraint`] naming the referrers when `target` is referenced.
    pub fn ensure_unreferenced(&self, target: &str) -> Result<(), DatabaseError> {
        match self.by_target.get(target) {
            None => Ok(()),
            Some(referrers) => Err(DatabaseError::Constraint {
                message: format!("{target} is referenced by {}", referrers.iter().cloned().collect::<Vec<_>>().join(", "))
                    .into(),
                context: None,
            }),
        }
    }

    pub fn clear(&mut self) {
        self.by_target.clear();
        self.by_referrer.clear();
    }

    /// Number of referenced targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_target.len()
    }
}
