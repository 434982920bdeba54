//! Async driver for the deferred work (feature `async`).
//!
//! [`run`] polls the charger installed in a [`ChargerSlot`] and sleeps until the next deadline.
//! Interrupt shims reach the same charger through [`ChargerSlot::try_with`] between polls; the
//! slot is released before every sleep.

use embedded_hal::delay::DelayNs;
use embedded_hal_async::delay::DelayNs as AsyncDelayNs;

use crate::bus::RegisterBus;
use crate::charger::Charger;
use crate::error::Error;
use crate::platform::Platform;
use crate::scheduler::CancelToken;
use crate::slot::ChargerSlot;

/// Longest sleep between polls, also used while the slot is empty.
pub const IDLE_POLL_MS: u64 = 1_000;
/// Sleep granularity; cancellation is observed at this resolution.
pub const CANCEL_SLICE_MS: u64 = 50;

/// Run deferred work until `cancel` fires.
pub async fn run<'a, B, D, P, AD>(slot: &ChargerSlot<Charger<'a, B, D, P>>, delay: &mut AD, cancel: &CancelToken)
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
    AD: AsyncDelayNs,
{
    info!("charger service started");
    while !cancel.is_cancelled() {
        let polled = slot.with(|charger| {
            let next = charger.run_pending();
            Ok::<_, Error<B::Error>>((next, charger.now()))
        })
        .await;
        let wait_ms = match polled {
            Ok((Some(at), now)) => at.saturating_sub(now).min(IDLE_POLL_MS),
            Ok((None, _)) => IDLE_POLL_MS,
            Err(_) => {
                trace!("charger slot empty");
                IDLE_POLL_MS
            }
        };
        sleep(delay, cancel, wait_ms).await;
    }
    info!("charger service stopped");
}

async fn sleep<AD: AsyncDelayNs>(delay: &mut AD, cancel: &CancelToken, ms: u64) {
    let mut remaining = ms;
    while remaining > 0 && !cancel.is_cancelled() {
        let step = remaining.min(CANCEL_SLICE_MS);
        delay.delay_ms(step as u32).await;
        remaining -= step;
    }
}
