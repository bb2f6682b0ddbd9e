//! Debounced dispatch of facet-state triggers.
//!
//! Text input is held until it has been quiet for the configured window;
//! every new text replaces the pending one. Other triggers pass straight
//! through and never touch the pending text.

use std::time::Duration;

use pixelynth_core::FacetUpdate;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Text(String),
    Facet(FacetUpdate),
    ClearFilters,
}

#[derive(Debug)]
pub struct Debouncer {
    quiescence: Duration,
    pending: Option<(String, Instant)>,
    superseded: u64,
}

impl Debouncer {
    pub fn new(quiescence: Duration) -> Self {
        Self { quiescence, pending: None, superseded: 0 }
    }

    pub fn quiescence(&self) -> Duration { self.quiescence }

    /// Returns the trigger when it must fire now; text is deferred and `None`
    /// is returned.
    pub fn schedule(&mut self, trigger: Trigger, now: Instant) -> Option<Trigger> {
        match trigger {
            Trigger::Text(text) => {
                if self.pending.replace((text, now + self.quiescence)).is_some() {
                    self.superseded += 1;
                }
                None
            }
            other => Some(other),
        }
    }

    pub fn deadline(&self) -> Option<Instant> { self.pending.as_ref().map(|(_, at)| *at) }

    pub fn is_pending(&self) -> bool { self.pending.is_some() }

    pub fn pending_text(&self) -> Option<&str> { self.pending.as_ref().map(|(t, _)| t.as_str()) }

    /// Text whose quiet period has elapsed by `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, at)) if *at <= now => self.pending.take().map(|(t, _)| t),
            _ => None,
        }
    }

    pub fn cancel(&mut self) -> Option<String> { self.pending.take().map(|(t, _)| t) }

    /// Text triggers replaced before they fired.
    pub fn superseded(&self) -> u64 { self.superseded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelynth_core::SortMode;

    fn ms(n: u64) -> Duration { Duration::from_millis(n) }

    #[test]
    fn last_text_wins_after_quiet_period() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300));
        for (at, text) in [(0, "r"), (50, "re"), (100, "red"), (250, "red car")] {
            assert!(d.schedule(Trigger::Text(text.into()), t0 + ms(at)).is_none());
        }
        assert_eq!(d.deadline(), Some(t0 + ms(550)));
        assert_eq!(d.take_due(t0 + ms(549)), None);
        assert_eq!(d.take_due(t0 + ms(550)).as_deref(), Some("red car"));
        assert!(!d.is_pending());
        assert_eq!(d.superseded(), 3);
    }

    #[test]
    fn facet_triggers_pass_through_and_keep_pending_text() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300));
        d.schedule(Trigger::Text("car".into()), t0);
        let fired = d.schedule(Trigger::Facet(FacetUpdate::Sort(SortMode::Newest)), t0 + ms(10));
        assert_eq!(fired, Some(Trigger::Facet(FacetUpdate::Sort(SortMode::Newest))));
        assert_eq!(d.pending_text(), Some("car"));
        assert_eq!(d.deadline(), Some(t0 + ms(300)));
    }

    #[test]
    fn cancel_drops_pending() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300));
        d.schedule(Trigger::Text("car".into()), t0);
        assert_eq!(d.cancel().as_deref(), Some("car"));
        assert_eq!(d.deadline(), None);
        assert_eq!(d.take_due(t0 + ms(1000)), None);
    }
}
