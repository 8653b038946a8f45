use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a load is fetching. Used for logging and failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadKind {
    Model,
    Environment,
    MaterialArchive,
    MaterialTextures,
}

impl LoadKind {
    pub const fn label(self) -> &'static str {
        match self {
            LoadKind::Model => "model",
            LoadKind::Environment => "environment",
            LoadKind::MaterialArchive => "material archive",
            LoadKind::MaterialTextures => "material textures",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Counts in-flight loads and derives the loading indicator from them.
///
/// The indicator turns on with the first load and turns off only after every
/// load has finished and `settle` has elapsed without a new one starting.
#[derive(Debug)]
pub struct LoadingTracker {
    settle: Duration,
    next_ticket: u64,
    in_flight: HashMap<LoadTicket, LoadKind>,
    visible: bool,
    published: bool,
    settle_deadline: Option<Instant>,
}

impl LoadingTracker {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            next_ticket: 0,
            in_flight: HashMap::new(),
            visible: false,
            published: false,
            settle_deadline: None,
        }
    }

    pub fn begin(&mut self, kind: LoadKind) -> LoadTicket {
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        self.in_flight.insert(ticket, kind);
        self.settle_deadline = None;
        self.visible = true;
        log::debug!("Load {} started ({})", ticket.0, kind.label());
        ticket
    }

    pub fn finish(&mut self, ticket: LoadTicket, now: Instant) {
        let Some(kind) = self.in_flight.remove(&ticket) else {
            log::warn!("Ignoring finish for unknown load ticket {}", ticket.0);
            return;
        };

        log::debug!("Load {} finished ({})", ticket.0, kind.label());

        if self.in_flight.is_empty() {
            self.settle_deadline = Some(now + self.settle);
        }
    }

    /// Forgets every in-flight load and hides the indicator without settling.
    /// Returns how many loads were abandoned.
    pub fn abandon_all(&mut self) -> usize {
        let abandoned = self.in_flight.len();
        self.in_flight.clear();
        self.settle_deadline = None;
        self.visible = false;
        abandoned
    }

    /// Applies an expired settle deadline and returns a visibility change that
    /// has not been reported yet.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        if let Some(deadline) = self.settle_deadline {
            if now >= deadline && self.in_flight.is_empty() {
                self.settle_deadline = None;
                self.visible = false;
            }
        }
        self.take_change()
    }

    /// Reports a visibility change without consulting the clock.
    pub fn take_change(&mut self) -> Option<bool> {
        if self.visible == self.published {
            return None;
        }
        self.published = self.visible;
        Some(self.visible)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_pending(&self, ticket: LoadTicket) -> bool {
        self.in_flight.contains_key(&ticket)
    }

    pub fn settle_deadline(&self) -> Option<Instant> {
        self.settle_deadline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

/// Monotonic request tokens for one concern. Only the newest token is current.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self) -> Generation {
        self.current = Generation(self.current.0 + 1);
        self.current
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTLE: Duration = Duration::from_millis(600);

    #[test]
    fn abandoning_hides_without_settling() {
        let start = Instant::now();
        let mut tracker = LoadingTracker::new(SETTLE);
        let first = tracker.begin(LoadKind::Model);
        tracker.begin(LoadKind::Environment);
        assert_eq!(tracker.take_change(), Some(true));

        assert_eq!(tracker.abandon_all(), 2);
        assert_eq!(tracker.take_change(), Some(false));
        assert_eq!(tracker.in_flight(), 0);

        tracker.finish(first, start);
        assert_eq!(tracker.poll(start + SETTLE), None);
    }

    #[test]
    fn indicator_settles_after_delay() {
        let start = Instant::now();
        let mut tracker = LoadingTracker::new(SETTLE);

        let ticket = tracker.begin(LoadKind::Model);
        assert_eq!(tracker.poll(start), Some(true));

        tracker.finish(ticket, start);
        assert_eq!(tracker.poll(start + Duration::from_millis(599)), None);
        assert!(tracker.is_visible());

        assert_eq!(tracker.poll(start + SETTLE), Some(false));
        assert_eq!(tracker.poll(start + SETTLE * 2), None);
    }

    #[test]
    fn new_load_before_deadline_keeps_indicator_on() {
        let start = Instant::now();
        let mut tracker = LoadingTracker::new(SETTLE);

        let first = tracker.begin(LoadKind::Model);
        tracker.finish(first, start);
        assert_eq!(tracker.take_change(), Some(true));

        let second = tracker.begin(LoadKind::Environment);
        assert_eq!(tracker.poll(start + SETTLE * 2), None);
        assert!(tracker.is_visible());

        let later = start + SETTLE * 2;
        tracker.finish(second, later);
        assert_eq!(tracker.poll(later + SETTLE), Some(false));
    }

    #[test]
    fn overlapping_loads_hide_after_the_last() {
        let start = Instant::now();
        let mut tracker = LoadingTracker::new(SETTLE);

        let a = tracker.begin(LoadKind::Model);
        let b = tracker.begin(LoadKind::MaterialArchive);
        tracker.finish(a, start);
        assert_eq!(tracker.settle_deadline(), None);
        assert_eq!(tracker.in_flight(), 1);

        tracker.finish(b, start);
        assert_eq!(tracker.poll(start + SETTLE), Some(false));
    }

    #[test]
    fn unknown_ticket_is_ignored() {
        let start = Instant::now();
        let mut tracker = LoadingTracker::new(SETTLE);

        let ticket = tracker.begin(LoadKind::Model);
        tracker.finish(ticket, start);
        tracker.finish(ticket, start);
        assert_eq!(tracker.in_flight(), 0);
        assert!(!tracker.is_pending(ticket));
    }

    #[test]
    fn generations_only_accept_newest() {
        let mut counter = GenerationCounter::new();
        let first = counter.advance();
        let second = counter.advance();

        assert!(second > first);
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
    }
}
