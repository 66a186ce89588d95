//! Alarm edge detection and mute suppression
//!
//! The engine diffs successive chamber states and turns flag changes into
//! discrete [`AlarmEvent`]s. It is owned by the poll task and mutated only
//! there (single-writer confinement), so the previous-state slot and the
//! mute table need no locking. Mute windows suppress the broadcast of a
//! Raised edge without touching edge tracking; Cleared edges always pass.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use chamber_model::{seat_label, AlarmEvent, AlarmKind, AlarmStatus, ChamberState};

/// Mute table key: one live window per chamber/alarm pair
type MuteKey = (String, AlarmKind);

pub struct AlarmEngine {
    /// Chamber this bridge instance serves; mutes for other chambers are
    /// rejected
    chamber: String,
    default_mute: Duration,
    /// Flag vector from the last non-stale cycle; `None` until the first
    /// state arrives
    previous: Option<AlarmStatus>,
    mutes: HashMap<MuteKey, Instant>,
}

impl AlarmEngine {
    pub fn new(chamber: impl Into<String>, default_mute: Duration) -> Self {
        AlarmEngine {
            chamber: chamber.into(),
            default_mute,
            previous: None,
            mutes: HashMap::new(),
        }
    }

    /// Feed the next state snapshot; returns the alarm edges to broadcast.
    ///
    /// The first snapshot only records a baseline: a chamber that boots
    /// with an alarm already active must not replay it as a fresh edge.
    /// Stale snapshots change nothing; a failed poll cycle cannot
    /// manufacture transitions.
    pub fn observe(&mut self, state: &ChamberState) -> Vec<AlarmEvent> {
        if state.stale {
            return Vec::new();
        }

        let current = state.alarms;
        let previous = match self.previous.replace(current) {
            Some(previous) => previous,
            None => {
                debug!(chamber = %self.chamber, "alarm baseline recorded");
                return Vec::new();
            }
        };

        let now = Instant::now();
        let mut events = Vec::new();

        for kind in AlarmKind::ALL {
            let was = previous.is_active(kind);
            let is = current.is_active(kind);
            if was == is {
                continue;
            }

            if is {
                // Raised edge: tracking is already updated above, so a
                // muted alarm that clears and re-raises later still
                // produces a clean edge.
                if self.is_muted(kind, now) {
                    debug!(chamber = %self.chamber, alarm = %kind, "raised edge muted");
                    continue;
                }
                let mut event = AlarmEvent::raised(kind);
                if kind == AlarmKind::SeatAlarm {
                    event = event.with_seat_label(seat_label(state.seat_code));
                }
                events.push(event);
            } else {
                events.push(AlarmEvent::cleared(kind));
            }
        }

        events
    }

    /// Install a mute window for the given alarm; replaces any live window
    /// for the same key.
    pub fn mute(&mut self, kind: AlarmKind, chamber: &str, duration: Option<Duration>) {
        if chamber != self.chamber {
            warn!(
                requested = chamber,
                serving = %self.chamber,
                "mute request for a chamber this bridge does not serve"
            );
            return;
        }
        let duration = duration.unwrap_or(self.default_mute);
        let expires_at = Instant::now() + duration;
        self.mutes.insert((chamber.to_string(), kind), expires_at);
        debug!(chamber, alarm = %kind, ?duration, "alarm muted");
    }

    /// Remove a mute window before it expires
    pub fn unmute(&mut self, kind: AlarmKind, chamber: &str) {
        if self.mutes.remove(&(chamber.to_string(), kind)).is_some() {
            debug!(chamber, alarm = %kind, "alarm unmuted");
        }
    }

    /// Lazily expire and test the window for this kind
    fn is_muted(&mut self, kind: AlarmKind, now: Instant) -> bool {
        let key = (self.chamber.clone(), kind);
        if let Some(expires_at) = self.mutes.get(&key).copied() {
            if expires_at > now {
                return true;
            }
            self.mutes.remove(&key);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAMBER: &str = "main";

    fn engine() -> AlarmEngine {
        AlarmEngine::new(CHAMBER, Duration::from_secs(300))
    }

    fn state_with_word(word: u16, seat_code: u16) -> ChamberState {
        let mut state = ChamberState::disconnected();
        state.connected = true;
        state.stale = false;
        state.alarms = AlarmStatus::from_word(word);
        state.seat_code = seat_code;
        state
    }

    fn quiet() -> ChamberState {
        state_with_word(0, 0)
    }

    #[test]
    fn test_first_state_emits_nothing_even_with_active_alarms() {
        let mut engine = engine();
        // gate + seat + main smoke active at startup
        let events = engine.observe(&state_with_word(0b0010_0011, 21));
        assert!(events.is_empty());
    }

    #[test]
    fn test_single_raise_then_single_clear() {
        let mut engine = engine();
        engine.observe(&quiet());

        // gate + main flame (bit 4)
        let events = engine.observe(&state_with_word(0b0001_0001, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AlarmKind::MainFlame);
        assert!(events[0].is_raised());

        let events = engine.observe(&quiet());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AlarmKind::MainFlame);
        assert!(!events[0].is_raised());
    }

    #[test]
    fn test_steady_state_is_silent() {
        let mut engine = engine();
        engine.observe(&quiet());

        let alarmed = state_with_word(0b0000_0111, 0);
        assert_eq!(engine.observe(&alarmed).len(), 2);
        // Identical snapshot again: no events
        assert!(engine.observe(&alarmed).is_empty());
        assert!(engine.observe(&quiet()).len() == 2);
        assert!(engine.observe(&quiet()).is_empty());
    }

    #[test]
    fn test_seat_alarm_carries_label() {
        let mut engine = engine();
        engine.observe(&quiet());

        let events = engine.observe(&state_with_word(0b0011, 22));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AlarmKind::SeatAlarm);
        assert_eq!(events[0].seat_label.as_deref(), Some("Ante 1"));

        // Unknown seat codes pass through as numerals
        let mut engine = AlarmEngine::new(CHAMBER, Duration::from_secs(300));
        engine.observe(&quiet());
        let events = engine.observe(&state_with_word(0b0011, 18));
        assert_eq!(events[0].seat_label.as_deref(), Some("18"));
    }

    #[test]
    fn test_gate_drop_clears_all_active_kinds_in_canonical_order() {
        let mut engine = engine();
        engine.observe(&quiet());

        // seat + ante smoke (bit 6) + ante high O2 (bit 8) all raised
        let word = 0b0000_0001_0100_0011;
        assert_eq!(engine.observe(&state_with_word(word, 21)).len(), 3);

        // Gate drops with the sub-bits still set in the raw word
        let events = engine.observe(&state_with_word(word & !1, 21));
        let kinds: Vec<AlarmKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![AlarmKind::SeatAlarm, AlarmKind::AnteSmoke, AlarmKind::AnteHighO2]
        );
        assert!(events.iter().all(|e| !e.is_raised()));
    }

    #[test]
    fn test_mute_suppresses_raise_but_tracks_the_edge() {
        let mut engine = engine();
        engine.observe(&quiet());

        engine.mute(AlarmKind::MainSmoke, CHAMBER, None);

        // Raised while muted: no broadcast
        let alarmed = state_with_word(0b0010_0001, 0);
        assert!(engine.observe(&alarmed).is_empty());

        // Unmuting does not replay the transition that already happened
        engine.unmute(AlarmKind::MainSmoke, CHAMBER);
        assert!(engine.observe(&alarmed).is_empty());

        // The clear edge still fires exactly once
        let events = engine.observe(&quiet());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AlarmKind::MainSmoke);
        assert!(!events[0].is_raised());
    }

    #[test]
    fn test_cleared_edges_ignore_mutes() {
        let mut engine = engine();
        engine.observe(&quiet());

        let alarmed = state_with_word(0b0010_0001, 0);
        engine.observe(&alarmed);

        engine.mute(AlarmKind::MainSmoke, CHAMBER, None);
        let events = engine.observe(&quiet());
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_raised());
    }

    #[test]
    fn test_expired_mute_no_longer_suppresses() {
        let mut engine = engine();
        engine.observe(&quiet());

        engine.mute(AlarmKind::MainFlame, CHAMBER, Some(Duration::ZERO));
        let events = engine.observe(&state_with_word(0b0001_0001, 0));
        assert_eq!(events.len(), 1);
        assert!(events[0].is_raised());
    }

    #[test]
    fn test_new_mute_replaces_prior_window() {
        let mut engine = engine();
        engine.observe(&quiet());

        engine.mute(AlarmKind::MainFlame, CHAMBER, Some(Duration::from_secs(600)));
        // Replacing with an already-expired window effectively unmutes
        engine.mute(AlarmKind::MainFlame, CHAMBER, Some(Duration::ZERO));

        let events = engine.observe(&state_with_word(0b0001_0001, 0));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_mute_for_foreign_chamber_is_ignored() {
        let mut engine = engine();
        engine.observe(&quiet());

        engine.mute(AlarmKind::MainFlame, "chamber-2", None);
        let events = engine.observe(&state_with_word(0b0001_0001, 0));
        assert_eq!(events.len(), 1, "foreign-chamber mute must not apply");
    }

    #[test]
    fn test_stale_snapshots_manufacture_no_transitions() {
        let mut engine = engine();
        engine.observe(&quiet());

        let alarmed = state_with_word(0b0001_0001, 0);
        assert_eq!(engine.observe(&alarmed).len(), 1);

        // Two stale cycles whose decoded flags differ from reality
        let stale = alarmed.as_stale(false);
        assert!(engine.observe(&stale).is_empty());
        assert!(engine.observe(&stale).is_empty());

        // Recovery with the same flags: still no spurious edge
        assert!(engine.observe(&alarmed).is_empty());
        // Recovery with the alarm gone: exactly one clear
        assert_eq!(engine.observe(&quiet()).len(), 1);
    }
}
