// Live-sync poll scheduler.
//
// While event mode is on, a timer task sends `AppEvent::PollTick` every
// interval. Each arm/disarm bumps a generation counter; ticks and fetch
// results carrying an older generation belong to a superseded schedule and
// are discarded. At most one timer task exists at a time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::protocol::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Run,
    /// The client is not visible.
    SkipHidden,
    /// The previous tick is still fetching; this one is dropped.
    SkipBusy,
    /// Tick from a cancelled timer.
    Stale,
}

pub struct LiveSync {
    interval: Duration,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    in_flight: bool,
}

impl LiveSync {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            timer: None,
            generation: 0,
            in_flight: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn is_ticking(&self) -> bool {
        self.in_flight
    }

    /// Start a fresh timer, cancelling any existing one first. The first tick
    /// fires one full interval from now.
    pub fn arm(&mut self, tx: mpsc::Sender<AppEvent>) {
        self.disarm();
        let generation = self.generation;
        let period = self.interval;

        self.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.send(AppEvent::PollTick { generation }).await.is_err() {
                    break;
                }
            }
        }));
        debug!("Live sync armed (gen: {generation}, every {period:?})");
    }

    /// Cancel the timer and invalidate anything issued under the old
    /// generation.
    pub fn disarm(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.timer.take() {
            handle.abort();
            debug!("Live sync disarmed");
        }
    }

    pub fn restart(&mut self, event_mode: bool, tx: mpsc::Sender<AppEvent>) {
        if event_mode {
            self.arm(tx);
        } else {
            self.disarm();
        }
    }

    /// Decide what to do with a tick. `Run` sets the in-flight flag; the
    /// caller must report back through [`LiveSync::finish_tick`].
    pub fn begin_tick(&mut self, generation: u64, visible: bool) -> TickDecision {
        if generation != self.generation {
            return TickDecision::Stale;
        }
        if !visible {
            return TickDecision::SkipHidden;
        }
        if self.in_flight {
            return TickDecision::SkipBusy;
        }
        self.in_flight = true;
        TickDecision::Run
    }

    /// Clear the in-flight flag. Returns whether the result is still current.
    pub fn finish_tick(&mut self, generation: u64) -> bool {
        self.in_flight = false;
        generation == self.generation
    }
}

impl Drop for LiveSync {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}
