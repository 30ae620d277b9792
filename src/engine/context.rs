//! Audio Processing Context
//!
//! The single processing context a session renders through. It owns the
//! timeline clock every source and parameter is scheduled against, and the
//! lifecycle (running, suspended, closed) the platform imposes.
//!
//! The clock is built on `tokio::time::Instant`, so it only advances while
//! the context is running and follows paused test time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;
use tracing::debug;

use crate::config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::{Result, ReverieError};

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Running => write!(f, "running"),
            ContextState::Suspended => write!(f, "suspended"),
            ContextState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug)]
struct Clock {
    state: ContextState,
    /// Seconds accumulated before the current running stretch
    accumulated: f64,
    /// Start of the current running stretch
    running_since: Option<Instant>,
}

impl Clock {
    fn now(&self) -> f64 {
        self.accumulated
            + self
                .running_since
                .map(|since| since.elapsed().as_secs_f64())
                .unwrap_or(0.0)
    }
}

/// Handle to the processing context; clones share the same context
#[derive(Debug, Clone)]
pub struct AudioContext {
    sample_rate: u32,
    clock: Arc<Mutex<Clock>>,
}

impl AudioContext {
    /// Create a running context
    ///
    /// # Errors
    /// `Context` if the sample rate is outside what an output device accepts.
    pub fn new(sample_rate: u32) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(ReverieError::context(format!(
                "unsupported sample rate {} Hz",
                sample_rate
            )));
        }

        debug!(sample_rate, "audio context created");
        Ok(Self {
            sample_rate,
            clock: Arc::new(Mutex::new(Clock {
                state: ContextState::Running,
                accumulated: 0.0,
                running_since: Some(Instant::now()),
            })),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContextState::Running
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ContextState::Closed
    }

    /// Seconds of running time since creation
    pub fn current_time(&self) -> f64 {
        self.lock().now()
    }

    /// Freeze the clock; idempotent
    pub fn suspend(&self) {
        let mut clock = self.lock();
        if clock.state == ContextState::Running {
            clock.accumulated = clock.now();
            clock.running_since = None;
            clock.state = ContextState::Suspended;
            debug!(at = clock.accumulated, "audio context suspended");
        }
    }

    /// Restart the clock
    ///
    /// # Errors
    /// `Context` if the context has been closed.
    pub fn resume(&self) -> Result<()> {
        let mut clock = self.lock();
        match clock.state {
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                clock.running_since = Some(Instant::now());
                clock.state = ContextState::Running;
                debug!(at = clock.accumulated, "audio context resumed");
                Ok(())
            }
            ContextState::Closed => Err(ReverieError::context("audio context is closed")),
        }
    }

    /// Release the context; idempotent and terminal
    pub fn close(&self) {
        let mut clock = self.lock();
        if clock.state != ContextState::Closed {
            clock.accumulated = clock.now();
            clock.running_since = None;
            clock.state = ContextState::Closed;
            debug!("audio context closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        // The clock holds plain numbers; a poisoned guard is still consistent
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn test_rejects_unusable_sample_rate() {
        let err = AudioContext::new(1000).unwrap_err();
        assert_eq!(err.error_code(), "CONTEXT_ERROR");
        assert!(AudioContext::new(44100).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_while_running() {
        let ctx = AudioContext::new(48000).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_relative_eq!(ctx.current_time(), 1.5, epsilon = 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_freezes_while_suspended() {
        let ctx = AudioContext::new(48000).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.suspend();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_relative_eq!(ctx.current_time(), 1.0, epsilon = 1e-3);

        ctx.resume().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_relative_eq!(ctx.current_time(), 2.0, epsilon = 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_is_idempotent() {
        let ctx = AudioContext::new(48000).unwrap();
        ctx.suspend();
        ctx.suspend();
        assert_eq!(ctx.state(), ContextState::Suspended);
        ctx.resume().unwrap();
        ctx.resume().unwrap();
        assert!(ctx.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_context_cannot_resume() {
        let ctx = AudioContext::new(48000).unwrap();
        ctx.close();
        ctx.close();
        assert!(ctx.is_closed());
        assert!(ctx.resume().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_state() {
        let ctx = AudioContext::new(48000).unwrap();
        let other = ctx.clone();
        other.suspend();
        assert_eq!(ctx.state(), ContextState::Suspended);
    }
}
