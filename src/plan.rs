use core::iter::FusedIterator;

use crate::event::Table;

/// Highest stored event number per event table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HighWater {
    pub outage: i64,
    pub hijack: i64,
    pub leak: i64,
}

impl HighWater {
    pub fn set(&mut self, table: Table, id: i64) {
        match table {
            Table::Outage => self.outage = id,
            Table::Hijack => self.hijack = id,
            Table::Leak => self.leak = id,
            Table::Leaker => {}
        }
    }

    pub const fn get(&self, table: Table) -> Option<i64> {
        match table {
            Table::Outage => Some(self.outage),
            Table::Hijack => Some(self.hijack),
            Table::Leak => Some(self.leak),
            Table::Leaker => None,
        }
    }

    /// Event numbers are assigned from one sequence, so resuming starts after the highest of all.
    pub fn global(&self) -> i64 {
        self.outage.max(self.hijack).max(self.leak)
    }
}

/// Event numbers still to fetch, newest first: `from`, `from - 1`, ..., `to_exclusive + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventRange {
    next: i64,
    to_exclusive: i64,
}

impl EventRange {
    pub const fn new(from: i64, to_exclusive: i64) -> Self {
        Self {
            next: from,
            to_exclusive,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.next <= self.to_exclusive
    }
}

impl Iterator for EventRange {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.is_empty() {
            return None;
        }
        let id = self.next;
        self.next -= 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.next.saturating_sub(self.to_exclusive)).unwrap_or(0);
        (left, Some(left))
    }
}

impl ExactSizeIterator for EventRange {}
impl FusedIterator for EventRange {}

/// Range between the timeline's newest event and what the store already has.
pub fn plan(latest: i64, high_water: &HighWater) -> EventRange {
    EventRange::new(latest, high_water.global())
}
