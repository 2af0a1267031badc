//! Session clock: one recurring tick that watches the session deadline.
//!
//! States are `Stopped → Running → Stopped`. While running, every tick
//! compares the deadline with "now":
//!
//! - `0 < left <= renewal_window` → `on_near_expiry` (possibly on several
//!   consecutive ticks, so the hook must tolerate repeats)
//! - `left <= 0` → `on_expired`, then the clock stops
//!
//! The clock owns an [`ActivityMonitor`]; activity slides the deadline
//! forward by the session's original length, and stopping the clock always
//! releases the monitor.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::activity::{ActivityMonitor, Listener};
use crate::time::TimeSource;

/// Callback without payload.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving the new deadline after an activity extension.
pub type ExtendHook = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;

#[derive(Clone)]
pub struct ClockHooks {
    pub on_near_expiry: Hook,
    pub on_expired: Hook,
    pub on_extended: Option<ExtendHook>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    pub tick_interval: Duration,
    pub renewal_window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    NearExpiry,
    Expired,
}

/// Classify one tick.
pub fn evaluate(deadline: DateTime<Utc>, now: DateTime<Utc>, renewal_window: Duration) -> TickOutcome {
    let left = deadline - now;
    if left <= chrono::Duration::zero() {
        return TickOutcome::Expired;
    }
    match chrono::Duration::from_std(renewal_window) {
        Ok(window) if left <= window => TickOutcome::NearExpiry,
        Ok(_) => TickOutcome::Idle,
        // A window too large to represent covers every deadline.
        Err(_) => TickOutcome::NearExpiry,
    }
}

/// Monotonic deadline shared between the tick loop and activity callbacks.
#[derive(Debug)]
struct Deadline(Mutex<DateTime<Utc>>);

impl Deadline {
    fn get(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance_to(&self, at: DateTime<Utc>) -> bool {
        let mut current = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if at > *current {
            *current = at;
            true
        } else {
            false
        }
    }
}

struct ClockRun {
    deadline: Arc<Deadline>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

pub struct SessionClock {
    config: ClockConfig,
    time: Arc<dyn TimeSource>,
    monitor: ActivityMonitor,
    run: Mutex<Option<ClockRun>>,
}

impl SessionClock {
    pub fn new(config: ClockConfig, time: Arc<dyn TimeSource>, monitor: ActivityMonitor) -> Self {
        Self {
            config,
            time,
            monitor,
            run: Mutex::new(None),
        }
    }

    /// Start ticking towards `expires_at`, replacing any previous run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, expires_at: DateTime<Utc>, hooks: ClockHooks) {
        self.stop();

        let deadline = Arc::new(Deadline(Mutex::new(expires_at)));
        let shutdown = Arc::new(Notify::new());

        // Original session length; activity re-arms the deadline to now + this.
        let slide = (expires_at - self.time.now()).max(chrono::Duration::zero());
        let on_signal: Listener = {
            let deadline = Arc::clone(&deadline);
            let time = Arc::clone(&self.time);
            let on_extended = hooks.on_extended.clone();
            Arc::new(move || {
                let at = time.now() + slide;
                if deadline.advance_to(at) {
                    if let Some(cb) = &on_extended {
                        cb(at);
                    }
                }
            })
        };
        self.monitor.start(on_signal);

        let task = tokio::spawn(tick_loop(
            Arc::clone(&deadline),
            Arc::clone(&shutdown),
            Arc::clone(&self.time),
            self.monitor.clone(),
            hooks,
            self.config,
        ));

        tracing::debug!(%expires_at, tick = ?self.config.tick_interval, "session clock started");

        *self.lock() = Some(ClockRun {
            deadline,
            shutdown,
            task,
        });
    }

    /// Move the deadline forward without restarting the tick.
    ///
    /// Ignored unless running and `expires_at` is later than the current
    /// deadline. Returns whether the deadline changed.
    pub fn reset(&self, expires_at: DateTime<Utc>) -> bool {
        match self.lock().as_ref() {
            Some(run) if !run.task.is_finished() => run.deadline.advance_to(expires_at),
            _ => false,
        }
    }

    /// Cancel the tick and release the activity monitor. Idempotent.
    pub fn stop(&self) {
        if let Some(run) = self.lock().take() {
            run.shutdown.notify_one();
            run.task.abort();
            tracing::debug!("session clock stopped");
        }
        self.monitor.stop();
    }

    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|run| !run.task.is_finished())
    }

    /// Current deadline while running.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .as_ref()
            .filter(|run| !run.task.is_finished())
            .map(|run| run.deadline.get())
    }

    pub fn monitor(&self) -> &ActivityMonitor {
        &self.monitor
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ClockRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop(
    deadline: Arc<Deadline>,
    shutdown: Arc<Notify>,
    time: Arc<dyn TimeSource>,
    monitor: ActivityMonitor,
    hooks: ClockHooks,
    config: ClockConfig,
) {
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = interval.tick() => {
                match evaluate(deadline.get(), time.now(), config.renewal_window) {
                    TickOutcome::Idle => {}
                    TickOutcome::NearExpiry => {
                        tracing::debug!(deadline = %deadline.get(), "session near expiry");
                        (hooks.on_near_expiry)();
                    }
                    TickOutcome::Expired => {
                        tracing::info!(deadline = %deadline.get(), "session expired");
                        monitor.stop();
                        (hooks.on_expired)();
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityBus, SignalKind};
    use crate::time::TokioTimeSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        bus: Arc<ActivityBus>,
        clock: SessionClock,
        start: DateTime<Utc>,
        near: Arc<AtomicUsize>,
        expired: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new(tick_secs: u64, window_secs: u64) -> Self {
            let bus = Arc::new(ActivityBus::new());
            let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
            let clock = SessionClock::new(
                ClockConfig {
                    tick_interval: Duration::from_secs(tick_secs),
                    renewal_window: Duration::from_secs(window_secs),
                },
                Arc::new(TokioTimeSource::new(start)),
                ActivityMonitor::new(Arc::clone(&bus), &SignalKind::ALL),
            );
            Self {
                bus,
                clock,
                start,
                near: Arc::new(AtomicUsize::new(0)),
                expired: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn hooks(&self) -> ClockHooks {
            let near = Arc::clone(&self.near);
            let expired = Arc::clone(&self.expired);
            ClockHooks {
                on_near_expiry: Arc::new(move || {
                    near.fetch_add(1, Ordering::SeqCst);
                }),
                on_expired: Arc::new(move || {
                    expired.fetch_add(1, Ordering::SeqCst);
                }),
                on_extended: None,
            }
        }

        fn at(&self, secs: i64) -> DateTime<Utc> {
            self.start + chrono::Duration::seconds(secs)
        }
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[test]
    fn evaluate_classifies_time_left() {
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        let window = Duration::from_secs(60);
        let secs = |s| now + chrono::Duration::seconds(s);

        assert_eq!(evaluate(secs(120), now, window), TickOutcome::Idle);
        assert_eq!(evaluate(secs(60), now, window), TickOutcome::NearExpiry);
        assert_eq!(evaluate(secs(1), now, window), TickOutcome::NearExpiry);
        assert_eq!(evaluate(secs(0), now, window), TickOutcome::Expired);
        assert_eq!(evaluate(secs(-5), now, window), TickOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_near_expiry_then_expired_and_stops() {
        let fx = Fixture::new(10, 20);
        fx.clock.start(fx.at(45), fx.hooks());

        // Ticks at 0,10,20 are idle; 30 and 40 are inside the window.
        sleep_secs(41).await;
        assert_eq!(fx.near.load(Ordering::SeqCst), 2);
        assert_eq!(fx.expired.load(Ordering::SeqCst), 0);

        sleep_secs(10).await;
        assert_eq!(fx.expired.load(Ordering::SeqCst), 1);
        assert!(!fx.clock.is_running());
        assert_eq!(fx.bus.listener_count(), 0);

        sleep_secs(60).await;
        assert_eq!(fx.expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_moves_the_deadline_for_real() {
        let fx = Fixture::new(1, 5);
        fx.clock.start(fx.at(10), fx.hooks());
        assert!(fx.clock.reset(fx.at(100)));

        sleep_secs(12).await;
        assert_eq!(fx.expired.load(Ordering::SeqCst), 0);
        assert!(fx.clock.is_running());
        assert_eq!(fx.clock.deadline(), Some(fx.at(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_never_moves_the_deadline_backwards() {
        let fx = Fixture::new(1, 5);
        fx.clock.start(fx.at(100), fx.hooks());

        assert!(!fx.clock.reset(fx.at(50)));
        assert_eq!(fx.clock.deadline(), Some(fx.at(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_ignored_while_stopped() {
        let fx = Fixture::new(1, 5);
        assert!(!fx.clock.reset(fx.at(100)));
        assert_eq!(fx.clock.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_slides_the_deadline() {
        let fx = Fixture::new(5, 10);
        let extended = Arc::new(Mutex::new(Vec::<DateTime<Utc>>::new()));
        let mut hooks = fx.hooks();
        let sink = Arc::clone(&extended);
        hooks.on_extended = Some(Arc::new(move |at: DateTime<Utc>| sink.lock().unwrap().push(at)));

        fx.clock.start(fx.at(30), hooks);

        sleep_secs(20).await;
        fx.bus.emit(SignalKind::KeyPress);
        assert_eq!(fx.clock.deadline(), Some(fx.at(50)));
        assert_eq!(*extended.lock().unwrap(), vec![fx.at(50)]);

        // Past the original deadline, still alive.
        sleep_secs(20).await;
        assert_eq!(fx.expired.load(Ordering::SeqCst), 0);
        assert!(fx.clock.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_a_single_tick_and_monitor() {
        let fx = Fixture::new(10, 20);
        fx.clock.start(fx.at(25), fx.hooks());
        fx.clock.start(fx.at(25), fx.hooks());

        assert_eq!(fx.bus.listener_count(), SignalKind::ALL.len());

        // Ticks at 0,10,20 → near fires on 10 and 20 once each, not twice.
        sleep_secs(21).await;
        assert_eq!(fx.near.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let fx = Fixture::new(10, 20);
        fx.clock.stop();
        fx.clock.stop();

        fx.clock.start(fx.at(100), fx.hooks());
        fx.clock.stop();
        fx.clock.stop();

        assert!(!fx.clock.is_running());
        assert_eq!(fx.bus.listener_count(), 0);

        sleep_secs(200).await;
        assert_eq!(fx.expired.load(Ordering::SeqCst), 0);
    }
}
