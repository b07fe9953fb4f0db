//! Modification clocks
//!
//! Each event the parser cares about is stamped from one monotonically
//! increasing counter, so "did A happen after B" is a plain comparison.

use std::fmt;

/// Events that carry a stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stamp {
    /// Settings changed, or anything else that invalidates a result
    Base,
    /// Formula text set or invalidated
    Function,
    /// A variable value set, added or removed
    Variables,
    /// Last successful compile
    Parse,
    /// Last successful evaluation
    Evaluate,
}

impl Stamp {
    const ALL: [Stamp; 5] = [
        Stamp::Base,
        Stamp::Function,
        Stamp::Variables,
        Stamp::Parse,
        Stamp::Evaluate,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stamp::Base => "base",
            Stamp::Function => "function",
            Stamp::Variables => "variables",
            Stamp::Parse => "parse",
            Stamp::Evaluate => "evaluate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationClock {
    tick: u64,
    stamps: [u64; 5],
}

impl ModificationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` as the most recent thing to happen.
    pub fn touch(&mut self, event: Stamp) {
        self.tick += 1;
        self.stamps[event.slot()] = self.tick;
    }

    pub fn get(&self, event: Stamp) -> u64 {
        self.stamps[event.slot()]
    }

    /// Whether `a` was stamped more recently than `b`.
    pub fn newer(&self, a: Stamp, b: Stamp) -> bool {
        self.get(a) > self.get(b)
    }

    /// Latest stamp of any event
    pub fn last_modified(&self) -> u64 {
        Stamp::ALL
            .iter()
            .map(|s| self.get(*s))
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_orders_events() {
        let mut clock = ModificationClock::new();
        clock.touch(Stamp::Function);
        clock.touch(Stamp::Parse);
        assert!(clock.newer(Stamp::Parse, Stamp::Function));

        clock.touch(Stamp::Function);
        assert!(clock.newer(Stamp::Function, Stamp::Parse));
    }

    #[test]
    fn test_last_modified_is_latest_stamp() {
        let mut clock = ModificationClock::new();
        assert_eq!(clock.last_modified(), 0);
        clock.touch(Stamp::Variables);
        clock.touch(Stamp::Base);
        assert_eq!(clock.last_modified(), clock.get(Stamp::Base));
        assert_eq!(clock.last_modified(), 2);
    }
}
