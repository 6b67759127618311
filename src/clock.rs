use common::messages::Snapshot;
use common::{Slot, SLOT_COUNT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const TICK: Duration = Duration::from_secs(1);

pub const TURN_SECS: u32 = 30;
pub const LONG_TURN_SECS: u32 = 45;
pub const MULLIGAN_SECS: u32 = 90;

pub type Clock = Arc<RwLock<TurnClock>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnClock {
    time_remaining: u32,
    // Raw turn numbers rather than slots: ending the turn of slot 3 or 4 doubles
    // past the last slot, which leaves nobody on turn until an admin starts one.
    active_turns: Vec<u8>,
    enabled: bool,
}

impl Default for TurnClock {
    fn default() -> Self {
        TurnClock {
            time_remaining: TURN_SECS,
            active_turns: vec![1],
            enabled: true,
        }
    }
}

impl TurnClock {
    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn active_turns(&self) -> &[u8] {
        &self.active_turns
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn start_turn(&mut self, slots: &[Slot], duration: u32) {
        if slots.is_empty() {
            return;
        }
        self.time_remaining = duration;
        self.active_turns = slots.iter().map(Slot::get).collect();
        info!(
            "turn started for {:?} with {}s",
            self.active_turns, self.time_remaining
        );
    }

    // Only the sole active slot may end its own turn. The next turn number is the
    // current one doubled, wrapping to 1 when it lands one past the last slot.
    pub fn end_turn(&mut self, by: Slot) -> bool {
        if self.active_turns != [by.get()] {
            return false;
        }
        let mut next = by.get() * 2;
        if next == SLOT_COUNT + 1 {
            next = 1;
        }
        self.time_remaining = TURN_SECS;
        self.active_turns = vec![next];
        info!("slot {} ended its turn, turn is now {:?}", by, self.active_turns);
        true
    }

    pub fn tick(&mut self) -> bool {
        if self.enabled && self.time_remaining > 0 {
            self.time_remaining -= 1;
            true
        } else {
            false
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_turn(&self, slot: Slot) -> bool {
        self.enabled && self.active_turns.contains(&slot.get())
    }

    pub fn snapshot(&self, slot: Option<Slot>) -> Snapshot {
        Snapshot {
            time: self.time_remaining,
            is_turn: slot.map_or(false, |s| self.is_turn(s)),
        }
    }
}

/// Owns the single task that counts the shared clock down.
///
/// Every connection reads the same clock, so the countdown lives here instead of
/// in the per-connection write loops. The task is aborted when the `Ticker` is
/// stopped or dropped.
#[derive(Debug)]
pub struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn(clock: Clock, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            // Catch up on late wakeups so every elapsed period still counts once
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                let mut clock = clock.write().await;
                if clock.tick() {
                    debug!("clock ticked to {}", clock.time_remaining());
                }
            }
        });
        Ticker { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
