//! Active-Match Registry
//!
//! Names currently held by live match workers, keyed by worker handle.
//! Used only to reject duplicate identities at join time.

use tracing::warn;

/// Handle of a running match worker.
pub type WorkerId = tokio::task::Id;

/// Default number of identities tracked at once.
pub const DEFAULT_CAPACITY: usize = 100;

/// One participant of one live match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRecord<W> {
    /// Worker running the match.
    pub worker: W,
    /// Display name held by the participant.
    pub name: String,
}

/// Bounded set of active-match records.
///
/// Once full, new records are skipped rather than stored: those names are
/// simply not protected against duplicates for the life of that match.
#[derive(Debug)]
pub struct ActiveMatchRegistry<W = WorkerId> {
    records: Vec<ActiveRecord<W>>,
    capacity: usize,
}

impl<W: Copy + Eq + std::fmt::Debug> ActiveMatchRegistry<W> {
    /// Create a registry tracking at most `capacity` identities.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `names` as held by `worker`. Returns how many were stored.
    pub fn track<'a, I>(&mut self, worker: W, names: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut stored = 0;
        for name in names {
            if self.records.len() >= self.capacity {
                warn!(
                    "Active-match registry full ({}), not tracking {} for {:?}",
                    self.capacity, name, worker
                );
                continue;
            }
            self.records.push(ActiveRecord {
                worker,
                name: name.to_string(),
            });
            stored += 1;
        }
        stored
    }

    /// Drop every record of `worker`, returning the released names.
    pub fn release(&mut self, worker: W) -> Vec<String> {
        let mut released = Vec::new();
        self.records.retain(|record| {
            if record.worker == worker {
                released.push(record.name.clone());
                false
            } else {
                true
            }
        });
        released
    }

    /// Whether any live match holds `name`.
    pub fn contains_name(&self, name: &str) -> bool {
        self.records.iter().any(|record| record.name == name)
    }

    /// Names currently held.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.name.as_str())
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Upper bound on tracked identities.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<W: Copy + Eq + std::fmt::Debug> Default for ActiveMatchRegistry<W> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
