//! Named, one-shot/periodic timer service backed by the same chaining
//! map substrate as the registry, keyed by the CRC-32 of the timer's
//! name (matching the original library's own timer-name hash).

use crate::collections::ChainMap;
use tst_proto::crc::crc32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Active,
    Paused,
    Completed,
    Cancelled,
}

struct TimerRecord {
    initial_ms: u32,
    remaining_ms: u32,
    state: TimerState,
    kind: TimerKind,
    expired: bool,
}

fn timer_hash(name: &str) -> u32 {
    crc32(name.as_bytes())
}

/// Named timer map plus the `tick` driver. One service instance belongs
/// to one engine handle, not a process-wide static.
#[derive(Default)]
pub struct TimerService {
    timers: ChainMap<TimerRecord>,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            timers: ChainMap::new(),
        }
    }

    fn start(&mut self, name: &str, duration_ms: u32, kind: TimerKind) {
        let key = timer_hash(name);
        self.timers.insert(
            key,
            TimerRecord {
                initial_ms: duration_ms,
                remaining_ms: duration_ms,
                state: TimerState::Active,
                kind,
                expired: false,
            },
        );
    }

    /// Starts a one-shot timer. A repeated call with the same name
    /// updates the existing entry in place: new duration, new kind,
    /// `remaining` reset to `initial`.
    pub fn start_one_shot(&mut self, name: &str, duration_ms: u32) {
        self.start(name, duration_ms, TimerKind::OneShot);
    }

    /// Starts a periodic timer; same update-in-place semantics as
    /// [`TimerService::start_one_shot`].
    pub fn start_periodic(&mut self, name: &str, duration_ms: u32) {
        self.start(name, duration_ms, TimerKind::Periodic);
    }

    /// Removes the timer atomically. No-op if the name is unknown.
    pub fn stop(&mut self, name: &str) {
        self.timers.remove(timer_hash(name));
    }

    pub fn pause(&mut self, name: &str) {
        if let Some(timer) = self.timers.get_mut(timer_hash(name)) {
            if timer.state == TimerState::Active {
                timer.state = TimerState::Paused;
            }
        }
    }

    pub fn resume(&mut self, name: &str) {
        if let Some(timer) = self.timers.get_mut(timer_hash(name)) {
            if timer.state == TimerState::Paused {
                timer.state = TimerState::Active;
            }
        }
    }

    /// Resets `remaining` back to `initial` and clears `expired`,
    /// without changing its running state.
    pub fn reset(&mut self, name: &str) {
        if let Some(timer) = self.timers.get_mut(timer_hash(name)) {
            timer.remaining_ms = timer.initial_ms;
            timer.expired = false;
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.timers.contains(timer_hash(name))
    }

    pub fn expired(&self, name: &str) -> Option<bool> {
        self.timers.get(timer_hash(name)).map(|t| t.expired)
    }

    pub fn remaining(&self, name: &str) -> Option<u32> {
        self.timers.get(timer_hash(name)).map(|t| t.remaining_ms)
    }

    pub fn state(&self, name: &str) -> Option<TimerState> {
        self.timers.get(timer_hash(name)).map(|t| t.state)
    }

    /// Count of timers currently `Active` or `Paused` (i.e. not yet
    /// completed or cancelled out of the map).
    pub fn active_count(&self) -> usize {
        self.timers
            .iter()
            .filter(|(_, t)| matches!(t.state, TimerState::Active | TimerState::Paused))
            .count()
    }

    /// Advances every `Active` timer by `elapsed_ms`, firing `on_expire`
    /// (keyed by the timer's CRC) for each one that crosses zero this tick.
    pub fn tick(&mut self, elapsed_ms: u32, mut on_expire: impl FnMut(u32)) {
        for (key, timer) in self.timers.iter_mut() {
            if timer.state != TimerState::Active {
                continue;
            }
            if timer.remaining_ms <= elapsed_ms {
                timer.remaining_ms = 0;
                timer.expired = true;
                on_expire(key);
                match timer.kind {
                    TimerKind::Periodic => {
                        timer.remaining_ms = timer.initial_ms;
                        timer.state = TimerState::Active;
                        timer.expired = false;
                    }
                    TimerKind::OneShot => {
                        timer.state = TimerState::Completed;
                    }
                }
            } else {
                timer.remaining_ms -= elapsed_ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_expires_and_completes() {
        let mut svc = TimerService::new();
        svc.start_one_shot("t", 100);
        svc.tick(40, |_| {});
        assert_eq!(svc.expired("t"), Some(false));
        svc.tick(40, |_| {});
        assert_eq!(svc.expired("t"), Some(false));
        svc.tick(40, |_| {});
        assert_eq!(svc.expired("t"), Some(true));
        assert_eq!(svc.remaining("t"), Some(0));
        assert_eq!(svc.state("t"), Some(TimerState::Completed));
        assert_eq!(svc.active_count(), 0);
    }

    #[test]
    fn periodic_reloads_and_never_double_fires_in_one_tick() {
        let mut svc = TimerService::new();
        svc.start_periodic("p", 100);
        for _ in 1..=5 {
            svc.tick(30, |_| {});
        }
        // cumulative: 30,60,90,120(fires,reload to 100-30leftover?),...
        assert_eq!(svc.active_count(), 1);
        assert_eq!(svc.state("p"), Some(TimerState::Active));
        assert_eq!(svc.expired("p"), Some(false));
    }

    #[test]
    fn repeated_start_updates_in_place() {
        let mut svc = TimerService::new();
        svc.start_one_shot("t", 50);
        svc.tick(10, |_| {});
        assert_eq!(svc.remaining("t"), Some(40));
        svc.start_one_shot("t", 200);
        assert_eq!(svc.remaining("t"), Some(200));
        assert_eq!(svc.state("t"), Some(TimerState::Active));
    }

    #[test]
    fn stop_removes_the_timer() {
        let mut svc = TimerService::new();
        svc.start_periodic("p", 10);
        svc.stop("p");
        assert!(!svc.exists("p"));
        assert_eq!(svc.active_count(), 0);
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let mut svc = TimerService::new();
        svc.start_periodic("p", 100);
        svc.pause("p");
        assert_eq!(svc.state("p"), Some(TimerState::Paused));
        svc.tick(1000, |_| {});
        assert_eq!(svc.remaining("p"), Some(100));
        svc.resume("p");
        assert_eq!(svc.state("p"), Some(TimerState::Active));
    }
}
