//! Per-checksum claims shared by writers and the garbage collector.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use strata_core::Sha1Checksum;
use tokio::sync::Notify;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Claim {
    /// Writers currently producing or pinning a copy.
    Adding(usize),
    /// The garbage collector is removing every copy.
    Deleting,
}

#[derive(Debug, Default)]
struct Claims {
    entries: DashMap<Sha1Checksum, Claim>,
    released: Notify,
}

/// Checksums with a write in progress or a deletion underway.
///
/// Adds, cache fills and background mirrors hold a shared add claim for as
/// long as the copy they produce is not yet accounted for. The garbage
/// collector takes the exclusive delete claim for a checksum from its final
/// recheck until every copy and the index row are gone. Adds wait for a
/// delete claim to be released; the collector never waits for adds.
#[derive(Clone, Debug, Default)]
pub struct InFlightSet {
    claims: Arc<Claims>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an add claim, waiting while the checksum is being deleted.
    pub async fn acquire(&self, checksum: Sha1Checksum) -> InFlightGuard {
        loop {
            let released = self.claims.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(guard) = self.try_acquire(checksum) {
                return guard;
            }
            tracing::debug!(checksum = %checksum, "waiting for deletion to finish");
            released.await;
        }
    }

    /// Take an add claim unless the checksum is being deleted.
    pub fn try_acquire(&self, checksum: Sha1Checksum) -> Option<InFlightGuard> {
        match self.claims.entries.entry(checksum) {
            Entry::Vacant(entry) => {
                entry.insert(Claim::Adding(1));
            }
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Claim::Adding(count) => *count += 1,
                Claim::Deleting => return None,
            },
        }
        Some(InFlightGuard {
            claims: Arc::clone(&self.claims),
            checksum,
        })
    }

    /// Take the delete claim. Fails while any add claim or another delete
    /// claim is held.
    pub fn try_begin_delete(&self, checksum: Sha1Checksum) -> Option<DeleteGuard> {
        match self.claims.entries.entry(checksum) {
            Entry::Vacant(entry) => {
                entry.insert(Claim::Deleting);
                Some(DeleteGuard {
                    claims: Arc::clone(&self.claims),
                    checksum,
                })
            }
            Entry::Occupied(_) => None,
        }
    }

    /// Whether both handles track the same claims.
    pub fn shares(&self, other: &InFlightSet) -> bool {
        Arc::ptr_eq(&self.claims, &other.claims)
    }

    /// Whether an add claim is held.
    pub fn contains(&self, checksum: &Sha1Checksum) -> bool {
        matches!(
            self.claims.entries.get(checksum).map(|c| *c),
            Some(Claim::Adding(_))
        )
    }

    /// Whether the delete claim is held.
    pub fn is_deleting(&self, checksum: &Sha1Checksum) -> bool {
        matches!(
            self.claims.entries.get(checksum).map(|c| *c),
            Some(Claim::Deleting)
        )
    }

    pub fn len(&self) -> usize {
        self.claims.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.entries.is_empty()
    }
}

/// Releases an add claim on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    claims: Arc<Claims>,
    checksum: Sha1Checksum,
}

impl InFlightGuard {
    pub fn checksum(&self) -> &Sha1Checksum {
        &self.checksum
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.claims.entries.entry(self.checksum) {
            match entry.get_mut() {
                Claim::Adding(count) if *count > 1 => *count -= 1,
                Claim::Adding(_) => {
                    entry.remove();
                }
                Claim::Deleting => {}
            }
        }
    }
}

/// Releases the delete claim on drop and wakes waiting adds.
#[derive(Debug)]
pub struct DeleteGuard {
    claims: Arc<Claims>,
    checksum: Sha1Checksum,
}

impl Drop for DeleteGuard {
    fn drop(&mut self) {
        self.claims
            .entries
            .remove_if(&self.checksum, |_, claim| *claim == Claim::Deleting);
        self.claims.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guards_nest() {
        let set = InFlightSet::new();
        let checksum = Sha1Checksum::compute(b"busy");

        let first = set.acquire(checksum).await;
        let second = set.acquire(checksum).await;
        assert!(set.contains(&checksum));
        assert_eq!(set.len(), 1);

        drop(first);
        assert!(set.contains(&checksum));
        drop(second);
        assert!(!set.contains(&checksum));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_delete_claim_excludes_adds() {
        let set = InFlightSet::new();
        let checksum = Sha1Checksum::compute(b"contended");

        let adding = set.try_acquire(checksum).unwrap();
        assert!(set.try_begin_delete(checksum).is_none());
        drop(adding);

        let deleting = set.try_begin_delete(checksum).unwrap();
        assert!(set.is_deleting(&checksum));
        assert!(!set.contains(&checksum));
        assert!(set.try_acquire(checksum).is_none());
        assert!(set.try_begin_delete(checksum).is_none());
        drop(deleting);

        assert!(set.is_empty());
        assert!(set.try_acquire(checksum).is_some());
    }

    #[tokio::test]
    async fn test_add_waits_for_delete() {
        let set = InFlightSet::new();
        let checksum = Sha1Checksum::compute(b"being deleted");
        let deleting = set.try_begin_delete(checksum).unwrap();

        let waiter = {
            let set = set.clone();
            tokio::spawn(async move {
                let _guard = set.acquire(checksum).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(deleting);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(set.is_empty());
    }
}
