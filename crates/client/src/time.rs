//! Wall-clock sources for session deadlines.

use chrono::{DateTime, Utc};

/// Source of "now" for deadline arithmetic.
pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock anchored at a fixed instant that advances with tokio's clock.
///
/// Under `tokio::time::pause()` this lets deadline checks and interval ticks
/// move in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct TokioTimeSource {
    anchor: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioTimeSource {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl TimeSource for TokioTimeSource {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().duration_since(self.origin);
        self.anchor + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
