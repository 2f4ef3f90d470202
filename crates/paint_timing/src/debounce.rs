use crate::host::{Host, TimerCallback};
use crate::subscription::Subscription;
use core::cell::Cell;
use core::time::Duration;
use std::rc::Rc;

struct Armed {
    timer: Subscription,
    fired: Rc<Cell<bool>>,
}

/// Restartable one-shot timer for the quiet period after the last candidate update.
///
/// Each [`QuietTimer::reset`] replaces the armed timer, so the callback only runs once
/// a full period passes without another reset.
pub struct QuietTimer {
    /// Length of the quiet window.
    period: Duration,
    armed: Option<Armed>,
    /// Number of times an armed timer was replaced before it fired.
    resets: u64,
}

impl QuietTimer {
    #[inline]
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            armed: None,
            resets: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Cancel the armed timer, if any, and arm a new one that runs `on_elapsed`.
    pub fn reset(&mut self, host: &dyn Host, on_elapsed: TimerCallback) {
        if self.is_pending() {
            self.resets = self.resets.saturating_add(1);
            log::debug!(
                "QuietTimer: restarting {}ms window (reset #{})",
                self.period.as_millis(),
                self.resets
            );
        }
        self.cancel();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let timer = host.set_timeout(
            self.period,
            Box::new(move || {
                flag.set(true);
                on_elapsed();
            }),
        );
        self.armed = Some(Armed { timer, fired });
    }

    /// Drop the armed timer without running it. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(mut armed) = self.armed.take() {
            armed.timer.cancel();
        }
    }

    /// Whether a timer is armed and has not fired yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.armed.as_ref().is_some_and(|armed| !armed.fired.get())
    }

    #[inline]
    #[must_use]
    pub const fn resets(&self) -> u64 {
        self.resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualHost;

    #[test]
    fn only_the_last_reset_fires() {
        let host = ManualHost::new();
        let fired_at = Rc::new(Cell::new(None));
        let mut quiet = QuietTimer::new(Duration::from_millis(5000));
        for at in [0.0, 1000.0, 4000.0] {
            host.advance_to(at);
            let sink = Rc::clone(&fired_at);
            let clock = Rc::clone(&host);
            quiet.reset(&*host, Box::new(move || sink.set(Some(clock.now_ms()))));
        }
        assert_eq!(quiet.resets(), 2);
        host.advance_to(8999.0);
        assert_eq!(fired_at.get(), None);
        assert!(quiet.is_pending());
        host.advance_to(9000.0);
        assert_eq!(fired_at.get(), Some(9000.0));
        assert!(!quiet.is_pending());
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn cancel_disarms() {
        let host = ManualHost::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let mut quiet = QuietTimer::new(Duration::from_millis(10));
        quiet.reset(&*host, Box::new(move || flag.set(true)));
        quiet.cancel();
        quiet.cancel();
        assert_eq!(host.run_until_idle(), 0);
        assert!(!fired.get());
        assert_eq!(quiet.resets(), 0);
    }
}
