//! Interval-driven readiness detection.
//!
//! Providers inject their content without a callback the host can subscribe
//! to, so readiness is detected by probing the page-global runtime on a fixed
//! interval. The first probe that finds a callable init entry point invokes it
//! and stops the interval.

use serde::{Deserialize, Serialize};

use crate::generation::GenerationId;
use crate::host::{CallbackKind, CallbackToken, RuntimeProbe, Scheduler, ScriptDocument, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PollOutcome {
    /// Init invoked on this attempt.
    Ready { attempts: u32 },
    /// Not yet; the interval keeps running.
    Pending { attempt: u32, probe: RuntimeProbe },
    /// Last attempt missed; the interval is cleared.
    Exhausted { attempts: u32 },
}

/// Fixed-interval probe of the provider runtime for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPoller {
    generation: GenerationId,
    interval_ms: u64,
    max_attempts: u32,
    attempts: u32,
    timer: Option<TimerId>,
}

impl ReadinessPoller {
    /// Arm the poll interval for `token.generation`.
    pub fn start<S: Scheduler + ?Sized>(
        scheduler: &mut S,
        token: CallbackToken,
        interval_ms: u64,
        max_attempts: u32,
    ) -> Self {
        let timer = scheduler.set_interval(interval_ms, token.with_kind(CallbackKind::PollTick));
        Self {
            generation: token.generation,
            interval_ms,
            max_attempts: max_attempts.max(1),
            attempts: 0,
            timer: Some(timer),
        }
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Handle one tick. Returns `None` for a tick that does not belong to this
    /// poller's generation or arrives after it stopped.
    pub fn tick<H: Scheduler + ScriptDocument + ?Sized>(
        &mut self,
        host: &mut H,
        generation: GenerationId,
    ) -> Option<PollOutcome> {
        if generation != self.generation || self.timer.is_none() {
            return None;
        }
        self.attempts += 1;
        let probe = host.probe_runtime();
        if probe == RuntimeProbe::Ready && host.invoke_init() {
            self.cancel(host);
            return Some(PollOutcome::Ready {
                attempts: self.attempts,
            });
        }
        if self.attempts >= self.max_attempts {
            self.cancel(host);
            return Some(PollOutcome::Exhausted {
                attempts: self.attempts,
            });
        }
        Some(PollOutcome::Pending {
            attempt: self.attempts,
            probe,
        })
    }

    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(timer) = self.timer.take() {
            scheduler.clear_timer(timer);
        }
    }
}
