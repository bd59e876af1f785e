//! Link timers driven by the frame layer.
//!
//! Starting a timer that is already armed re-arms it with the new duration.

use std::time::Duration;

/// The timers the frame layer arms or cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Primary: time to poll the secondary again.
    Poll,
    /// Primary: wait for the secondary's final frame.
    Final,
    /// Secondary: response deadline.
    Watchdog,
}

pub trait Timers {
    fn start(&mut self, kind: TimerKind, after: Duration);
    fn cancel(&mut self, kind: TimerKind);
}

/// Records armed timers; expiry is driven by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualTimers {
    poll: Option<Duration>,
    final_timer: Option<Duration>,
    watchdog: Option<Duration>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The duration a timer was last armed with, if it is armed.
    pub fn armed(&self, kind: TimerKind) -> Option<Duration> {
        match kind {
            TimerKind::Poll => self.poll,
            TimerKind::Final => self.final_timer,
            TimerKind::Watchdog => self.watchdog,
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed(kind).is_some()
    }

    /// Fire a timer: disarm it and report whether it was armed.
    pub fn expire(&mut self, kind: TimerKind) -> bool {
        self.slot(kind).take().is_some()
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<Duration> {
        match kind {
            TimerKind::Poll => &mut self.poll,
            TimerKind::Final => &mut self.final_timer,
            TimerKind::Watchdog => &mut self.watchdog,
        }
    }
}

impl Timers for ManualTimers {
    fn start(&mut self, kind: TimerKind, after: Duration) {
        *self.slot(kind) = Some(after);
    }

    fn cancel(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }
}

#[cfg(feature = "async")]
pub use self::tokio_timers::{TimerExpiry, TokioTimers};

#[cfg(feature = "async")]
mod tokio_timers {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tracing::trace;

    use super::{TimerKind, Timers};

    /// A timer that ran out, tagged with the arming it belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerExpiry {
        pub kind: TimerKind,
        pub generation: u64,
    }

    #[derive(Debug, Default)]
    struct Armed {
        token: Option<CancellationToken>,
        generation: u64,
    }

    /// Timers as cancellable delayed tasks on the current tokio runtime.
    ///
    /// Expiries are delivered over a channel so the link can process them in
    /// the same serialization domain as received frames. An expiry whose
    /// generation is no longer current was superseded by a later
    /// `start`/`cancel` and must be ignored; see [`is_current`](Self::is_current).
    #[derive(Debug)]
    pub struct TokioTimers {
        tx: mpsc::UnboundedSender<TimerExpiry>,
        handle: tokio::runtime::Handle,
        poll: Armed,
        final_timer: Armed,
        watchdog: Armed,
    }

    impl TokioTimers {
        /// Create timers bound to the current runtime.
        ///
        /// Panics if called outside a tokio runtime.
        pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerExpiry>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let timers = Self {
                tx,
                handle: tokio::runtime::Handle::current(),
                poll: Armed::default(),
                final_timer: Armed::default(),
                watchdog: Armed::default(),
            };
            (timers, rx)
        }

        /// Whether `expiry` belongs to the latest arming of its timer.
        pub fn is_current(&self, expiry: &TimerExpiry) -> bool {
            let armed = self.armed(expiry.kind);
            armed.token.is_some() && armed.generation == expiry.generation
        }

        /// Acknowledge a current expiry, disarming the timer.
        pub fn take_expiry(&mut self, expiry: &TimerExpiry) -> bool {
            if !self.is_current(expiry) {
                return false;
            }
            self.armed_mut(expiry.kind).token = None;
            true
        }

        fn armed(&self, kind: TimerKind) -> &Armed {
            match kind {
                TimerKind::Poll => &self.poll,
                TimerKind::Final => &self.final_timer,
                TimerKind::Watchdog => &self.watchdog,
            }
        }

        fn armed_mut(&mut self, kind: TimerKind) -> &mut Armed {
            match kind {
                TimerKind::Poll => &mut self.poll,
                TimerKind::Final => &mut self.final_timer,
                TimerKind::Watchdog => &mut self.watchdog,
            }
        }
    }

    impl Timers for TokioTimers {
        fn start(&mut self, kind: TimerKind, after: Duration) {
            self.cancel(kind);

            let token = CancellationToken::new();
            let child = token.clone();
            let tx = self.tx.clone();
            let armed = self.armed_mut(kind);
            armed.generation += 1;
            armed.token = Some(token);
            let generation = armed.generation;

            trace!(?kind, ?after, generation, "arming timer");
            self.handle.spawn(async move {
                tokio::select! {
                    _ = child.cancelled() => {}
                    _ = tokio::time::sleep(after) => {
                        let _ = tx.send(TimerExpiry { kind, generation });
                    }
                }
            });
        }

        fn cancel(&mut self, kind: TimerKind) {
            let armed = self.armed_mut(kind);
            if let Some(token) = armed.token.take() {
                token.cancel();
                armed.generation += 1;
            }
        }
    }

    impl Drop for TokioTimers {
        fn drop(&mut self) {
            for kind in [TimerKind::Poll, TimerKind::Final, TimerKind::Watchdog] {
                self.cancel(kind);
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn expiry_is_delivered() {
            let (mut timers, mut rx) = TokioTimers::new();
            timers.start(TimerKind::Final, Duration::from_millis(5));

            let expiry = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timer should fire")
                .expect("channel open");
            assert_eq!(expiry.kind, TimerKind::Final);
            assert!(timers.take_expiry(&expiry));
            assert!(!timers.is_current(&expiry));
        }

        #[tokio::test]
        async fn cancelled_timer_stays_silent() {
            let (mut timers, mut rx) = TokioTimers::new();
            timers.start(TimerKind::Poll, Duration::from_millis(20));
            timers.cancel(TimerKind::Poll);

            let result = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
            assert!(result.is_err(), "cancelled timer must not fire");
        }

        #[tokio::test]
        async fn rearming_supersedes_previous_generation() {
            let (mut timers, mut rx) = TokioTimers::new();
            timers.start(TimerKind::Watchdog, Duration::from_millis(5));
            timers.start(TimerKind::Watchdog, Duration::from_millis(10));

            let expiry = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timer should fire")
                .expect("channel open");
            assert_eq!(expiry.generation, 3);
            assert!(timers.is_current(&expiry));

            let stale = TimerExpiry {
                kind: TimerKind::Watchdog,
                generation: 1,
            };
            assert!(!timers.is_current(&stale));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timers_record_arming() {
        let mut timers = ManualTimers::new();
        timers.start(TimerKind::Final, Duration::from_millis(800));
        assert_eq!(
            timers.armed(TimerKind::Final),
            Some(Duration::from_millis(800))
        );
        assert!(!timers.is_armed(TimerKind::Watchdog));

        timers.start(TimerKind::Final, Duration::from_millis(300));
        assert_eq!(
            timers.armed(TimerKind::Final),
            Some(Duration::from_millis(300))
        );
    }

    #[test]
    fn manual_expire_disarms() {
        let mut timers = ManualTimers::new();
        timers.start(TimerKind::Poll, Duration::from_millis(10));
        assert!(timers.expire(TimerKind::Poll));
        assert!(!timers.expire(TimerKind::Poll));
        assert!(!timers.is_armed(TimerKind::Poll));
    }

    #[test]
    fn cancel_disarms() {
        let mut timers = ManualTimers::new();
        timers.start(TimerKind::Watchdog, Duration::from_secs(1));
        timers.cancel(TimerKind::Watchdog);
        assert!(!timers.is_armed(TimerKind::Watchdog));
    }
}
