//! Cancellable one-shot timers that report through the signal channel

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::signal::{Signal, SignalSender, TimerFired, TimerKind};

/// A single reusable timer slot
///
/// Arming always cancels the previous timer first. Each arm gets a new
/// generation number, so an expiry that was already queued when the slot was
/// cancelled or re-armed is rejected by [`TimerSlot::accept`].
#[derive(Debug)]
pub struct TimerSlot {
    kind: TimerKind,
    signals: SignalSender,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Create an idle timer slot
    #[must_use]
    pub const fn new(kind: TimerKind, signals: SignalSender) -> Self {
        Self {
            kind,
            signals,
            generation: 0,
            handle: None,
        }
    }

    /// Arm the timer, replacing any pending one
    pub fn arm(&mut self, delay: Duration) {
        self.cancel();

        let fired = TimerFired {
            kind: self.kind,
            generation: self.generation,
        };
        let signals = self.signals.clone();

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::Timer(fired));
        }));

        tracing::trace!(kind = ?self.kind, delay_ms = delay.as_millis(), "timer armed");
    }

    /// Cancel the pending timer, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::trace!(kind = ?self.kind, "timer cancelled");
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether a timer is pending
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Claim an expiry for this slot
    ///
    /// Returns true only for the expiry of the currently armed timer; the
    /// slot is disarmed afterwards.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        if fired.kind != self.kind || fired.generation != self.generation || self.handle.is_none()
        {
            tracing::trace!(kind = ?fired.kind, "ignoring stale timer");
            return false;
        }

        self.handle = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (tx, mut rx) = signal::channel();
        let mut slot = TimerSlot::new(TimerKind::Silence, tx);

        slot.arm(Duration::from_millis(200));
        assert!(slot.is_armed());

        let Some(Signal::Timer(fired)) = rx.recv().await else {
            panic!("expected timer signal");
        };
        assert!(slot.accept(fired));
        assert!(!slot.is_armed());

        // A duplicate delivery is refused
        assert!(!slot.accept(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_rejects_previous_generation() {
        let (tx, mut rx) = signal::channel();
        let mut slot = TimerSlot::new(TimerKind::Restart, tx);

        slot.arm(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // First expiry is queued but the slot is re-armed before it is handled
        slot.arm(Duration::from_millis(500));

        let Some(Signal::Timer(stale)) = rx.recv().await else {
            panic!("expected timer signal");
        };
        assert!(!slot.accept(stale));
        assert!(slot.is_armed());

        let Some(Signal::Timer(fresh)) = rx.recv().await else {
            panic!("expected timer signal");
        };
        assert!(slot.accept(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_delivery() {
        let (tx, mut rx) = signal::channel();
        let mut slot = TimerSlot::new(TimerKind::Stop, tx);

        slot.arm(Duration::from_millis(100));
        slot.cancel();
        assert!(!slot.is_armed());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_kind_is_rejected() {
        let (tx, _rx) = signal::channel();
        let mut slot = TimerSlot::new(TimerKind::Silence, tx);
        slot.arm(Duration::from_millis(100));

        let fired = TimerFired {
            kind: TimerKind::Restart,
            generation: 1,
        };
        assert!(!slot.accept(fired));
        assert!(slot.is_armed());
    }
}
