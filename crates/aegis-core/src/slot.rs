//! [`LatestCommandSlot`] – per-source freshness-gated latest-value store.
//!
//! One slot per [`CommandSource`], each behind its own mutex so sources
//! never contend with each other. A read returns the stored command only
//! while it is fresh; a stale entry is *not* cleared on read. It stays as
//! a tombstone that the next store overwrites, because clearing on read
//! would race with a concurrent fresh store for the same source.

use aegis_types::{Clock, Command, CommandSource, FRESHNESS_TIMEOUT};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Latest accepted command per source, gated by freshness on read.
pub struct LatestCommandSlot {
    slots: [Mutex<Option<Command>>; CommandSource::COUNT],
    freshness_timeout: Mutex<Duration>,
    clock: Arc<dyn Clock>,
}

impl LatestCommandSlot {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_freshness_timeout(clock, FRESHNESS_TIMEOUT)
    }

    pub fn with_freshness_timeout(clock: Arc<dyn Clock>, freshness_timeout: Duration) -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(None)),
            freshness_timeout: Mutex::new(freshness_timeout),
            clock,
        }
    }

    fn slot(&self, source: CommandSource) -> &Mutex<Option<Command>> {
        &self.slots[source.index()]
    }

    /// Replace the stored command for its source.
    pub fn store(&self, cmd: Command) {
        let mut slot = self.slot(cmd.source).lock().expect("command slot poisoned");
        *slot = Some(cmd);
    }

    /// The stored command for `source`, if present and fresh.
    ///
    /// Returns `None` for an empty slot *and* for a stale entry; the stale
    /// entry is left in place.
    pub fn get(&self, source: CommandSource) -> Option<Command> {
        let timeout = *self.freshness_timeout.lock().expect("freshness timeout poisoned");
        let now = self.clock.now();
        let slot = self.slot(source).lock().expect("command slot poisoned");
        slot.filter(|cmd| cmd.age(now) <= timeout)
    }

    /// Whether `source` currently holds a fresh command.
    pub fn has_fresh(&self, source: CommandSource) -> bool {
        self.get(source).is_some()
    }

    /// Remove the stored command for `source`.
    pub fn clear(&self, source: CommandSource) {
        let mut slot = self.slot(source).lock().expect("command slot poisoned");
        *slot = None;
    }

    /// Remove the stored command for every source.
    pub fn clear_all(&self) {
        for source in CommandSource::IN_PRIORITY_ORDER {
            self.clear(source);
        }
    }

    /// Age of the stored command for `source`, fresh or not. `None` when
    /// the slot is empty.
    pub fn age(&self, source: CommandSource) -> Option<Duration> {
        let now = self.clock.now();
        let slot = self.slot(source).lock().expect("command slot poisoned");
        slot.map(|cmd| cmd.age(now))
    }

    /// Update the freshness window applied by subsequent reads.
    pub fn set_freshness_timeout(&self, timeout: Duration) {
        *self.freshness_timeout.lock().expect("freshness timeout poisoned") = timeout;
    }
}
