//! [`PrioritySelector`] – fixed-priority arbitration over the command slots.
//!
//! Probes the slots in [`CommandSource::IN_PRIORITY_ORDER`] and returns the
//! first fresh command. A successful selection does **not** consume the
//! slot: the BCM expects a command every forwarder period, so the same
//! fresh command is legitimately re-selected until a newer one arrives or
//! it ages out.

use crate::slot::LatestCommandSlot;
use aegis_types::{Command, CommandSource};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorStats {
    pub selections_made: u64,
    pub safety_selections: u64,
    pub manual_selections: u64,
    pub remote_selections: u64,
    pub autonomous_selections: u64,
    pub no_valid_command_count: u64,
    pub last_selected_source: Option<CommandSource>,
}

/// Highest-priority-fresh-command selector.
pub struct PrioritySelector {
    slot: Arc<LatestCommandSlot>,
    stats: Mutex<SelectorStats>,
}

impl PrioritySelector {
    pub fn new(slot: Arc<LatestCommandSlot>) -> Self {
        Self {
            slot,
            stats: Mutex::new(SelectorStats::default()),
        }
    }

    /// The freshest command of the highest-priority source that has one.
    pub fn select(&self) -> Option<Command> {
        let selected = CommandSource::IN_PRIORITY_ORDER
            .into_iter()
            .find_map(|source| self.slot.get(source));

        let mut stats = self.stats.lock().expect("selector stats poisoned");
        stats.selections_made += 1;
        match &selected {
            Some(cmd) => {
                stats.last_selected_source = Some(cmd.source);
                match cmd.source {
                    CommandSource::Safety => stats.safety_selections += 1,
                    CommandSource::Manual => stats.manual_selections += 1,
                    CommandSource::Remote => stats.remote_selections += 1,
                    CommandSource::Autonomous => stats.autonomous_selections += 1,
                }
            }
            None => {
                stats.no_valid_command_count += 1;
                stats.last_selected_source = None;
            }
        }

        selected
    }

    /// Source of the most recent successful selection, if any.
    pub fn active_source(&self) -> Option<CommandSource> {
        self.stats.lock().expect("selector stats poisoned").last_selected_source
    }

    pub fn statistics(&self) -> SelectorStats {
        *self.stats.lock().expect("selector stats poisoned")
    }

    pub fn reset_statistics(&self) {
        *self.stats.lock().expect("selector stats poisoned") = SelectorStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::{Clock, CommandPayload, ManualClock};
    use std::time::Duration;

    fn fixture() -> (Arc<ManualClock>, Arc<LatestCommandSlot>, PrioritySelector) {
        let clock = Arc::new(ManualClock::new());
        let slot = Arc::new(LatestCommandSlot::new(clock.clone() as Arc<dyn Clock>));
        let selector = PrioritySelector::new(Arc::clone(&slot));
        (clock, slot, selector)
    }

    fn store(slot: &LatestCommandSlot, clock: &ManualClock, source: CommandSource, seq: u64) {
        slot.store(Command {
            source,
            sequence_number: seq,
            timestamp: clock.now(),
            payload: CommandPayload::default(),
        });
    }

    #[test]
    fn empty_slots_select_nothing() {
        let (_clock, _slot, selector) = fixture();
        assert!(selector.select().is_none());
        let stats = selector.statistics();
        assert_eq!(stats.no_valid_command_count, 1);
        assert_eq!(stats.last_selected_source, None);
    }

    #[test]
    fn single_source_wins_by_default() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Autonomous, 1);
        let cmd = selector.select().unwrap();
        assert_eq!(cmd.source, CommandSource::Autonomous);
    }

    #[test]
    fn higher_priority_source_preempts() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Autonomous, 1);
        store(&slot, &clock, CommandSource::Remote, 1);
        store(&slot, &clock, CommandSource::Manual, 1);
        assert_eq!(selector.select().unwrap().source, CommandSource::Manual);

        store(&slot, &clock, CommandSource::Safety, 1);
        assert_eq!(selector.select().unwrap().source, CommandSource::Safety);
    }

    #[test]
    fn selection_does_not_consume_the_slot() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Remote, 4);
        let first = selector.select().unwrap();
        let second = selector.select().unwrap();
        assert_eq!(first, second);
        assert_eq!(selector.statistics().remote_selections, 2);
    }

    #[test]
    fn stale_high_priority_falls_through_to_lower() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Manual, 1);
        clock.advance(Duration::from_millis(150));
        // Manual is now 150 ms old (fresh); Remote is newer.
        store(&slot, &clock, CommandSource::Remote, 1);
        assert_eq!(selector.select().unwrap().source, CommandSource::Manual);

        clock.advance(Duration::from_millis(100));
        // Manual aged out at 250 ms; Remote (100 ms) remains.
        assert_eq!(selector.select().unwrap().source, CommandSource::Remote);
    }

    #[test]
    fn all_stale_selects_nothing() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Safety, 1);
        store(&slot, &clock, CommandSource::Autonomous, 1);
        clock.advance(Duration::from_millis(300));
        assert!(selector.select().is_none());
        assert_eq!(selector.active_source(), None);
    }

    #[test]
    fn per_source_counters_accumulate() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Remote, 1);
        selector.select();
        store(&slot, &clock, CommandSource::Safety, 1);
        selector.select();
        selector.select();

        let stats = selector.statistics();
        assert_eq!(stats.selections_made, 3);
        assert_eq!(stats.remote_selections, 1);
        assert_eq!(stats.safety_selections, 2);
        assert_eq!(stats.last_selected_source, Some(CommandSource::Safety));
    }

    #[test]
    fn reset_statistics_clears_counters() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Manual, 1);
        selector.select();
        selector.reset_statistics();

        let stats = selector.statistics();
        assert_eq!(stats.selections_made, 0);
        assert_eq!(stats.manual_selections, 0);
        assert_eq!(stats.last_selected_source, None);
    }

    #[test]
    fn selected_command_is_always_fresh() {
        let (clock, slot, selector) = fixture();
        store(&slot, &clock, CommandSource::Remote, 1);
        clock.advance(Duration::from_millis(180));
        let cmd = selector.select().unwrap();
        assert!(cmd.age(clock.now()) <= Duration::from_millis(200));
    }
}
