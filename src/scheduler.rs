//! Deferred work bookkeeping.
//!
//! Every periodic or delayed job the charger runs has exactly one pending deadline. Scheduling a
//! job that is already pending moves its deadline; the owner polls [`Scheduler::take_due`] and
//! runs whatever has expired.

use core::sync::atomic::{AtomicBool, Ordering};

/// Deferred jobs run by [`crate::Charger::run_pending`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Work {
    /// End-of-charge evaluation.
    Eoc,
    /// Unplug, AICL and reverse-boost poll.
    UnplugCheck,
    /// Input collapse check after USB becomes valid.
    VinCollapseCheck,
    /// Recharge check after an end-of-charge stop.
    RechargeCheck,
    /// Restore VDD_MAX after the source-change flicker workaround.
    VddMaxResume,
    /// Periodic charge-failure clear.
    Heartbeat,
}

impl Work {
    pub const COUNT: usize = 6;

    /// Run order when several jobs are due at once.
    pub const ALL: [Work; Work::COUNT] = [
        Work::UnplugCheck,
        Work::VinCollapseCheck,
        Work::Eoc,
        Work::RechargeCheck,
        Work::VddMaxResume,
        Work::Heartbeat,
    ];

    fn slot(self) -> usize {
        match self {
            Work::UnplugCheck => 0,
            Work::VinCollapseCheck => 1,
            Work::Eoc => 2,
            Work::RechargeCheck => 3,
            Work::VddMaxResume => 4,
            Work::Heartbeat => 5,
        }
    }
}

/// One optional deadline (ms) per [`Work`] item.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    deadlines: [Option<u64>; Work::COUNT],
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            deadlines: [None; Work::COUNT],
        }
    }

    /// Run `work` at `now_ms + delay_ms`, replacing any pending deadline.
    pub fn schedule(&mut self, work: Work, now_ms: u64, delay_ms: u32) {
        self.deadlines[work.slot()] = Some(now_ms + delay_ms as u64);
    }

    /// Schedule `work` only if it is not already pending. Returns whether it was queued.
    pub fn schedule_if_idle(&mut self, work: Work, now_ms: u64, delay_ms: u32) -> bool {
        if self.is_pending(work) {
            return false;
        }
        self.schedule(work, now_ms, delay_ms);
        true
    }

    /// Drop a pending deadline. Returns whether one was pending.
    pub fn cancel(&mut self, work: Work) -> bool {
        self.deadlines[work.slot()].take().is_some()
    }

    pub fn cancel_all(&mut self) {
        self.deadlines = [None; Work::COUNT];
    }

    pub fn is_pending(&self, work: Work) -> bool {
        self.deadlines[work.slot()].is_some()
    }

    pub fn deadline(&self, work: Work) -> Option<u64> {
        self.deadlines[work.slot()]
    }

    /// Remove and return the first job whose deadline has passed.
    pub fn take_due(&mut self, now_ms: u64) -> Option<Work> {
        let work = Work::ALL
            .into_iter()
            .find(|w| self.deadlines[w.slot()].is_some_and(|at| at <= now_ms))?;
        self.deadlines[work.slot()] = None;
        Some(work)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.deadlines.iter().flatten().copied().min()
    }
}

/// Cooperative cancellation for long recovery sequences and the service loop.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
