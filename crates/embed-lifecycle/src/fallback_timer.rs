//! Per-generation fallback deadline.

use crate::generation::GenerationId;
use crate::host::{CallbackKind, CallbackToken, Scheduler, TimerId};

/// One-shot deadline after which a generation shows the fallback link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackTimer {
    generation: GenerationId,
    deadline_ms: u64,
    timer: Option<TimerId>,
    fired: bool,
}

impl FallbackTimer {
    /// Arm a one-shot deadline `timeout_ms` from `started_at_ms`.
    pub fn arm<S: Scheduler + ?Sized>(
        scheduler: &mut S,
        token: CallbackToken,
        started_at_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        let deadline_ms = started_at_ms.saturating_add(timeout_ms);
        let delay = deadline_ms.saturating_sub(scheduler.now_ms());
        let timer = scheduler.set_timeout(delay, token.with_kind(CallbackKind::FallbackDeadline));
        Self {
            generation: token.generation,
            deadline_ms,
            timer: Some(timer),
            fired: false,
        }
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Consume the expiry for `generation`. Returns `true` exactly once, and
    /// only for this timer's generation.
    pub fn expire(&mut self, generation: GenerationId) -> bool {
        if generation != self.generation || self.fired || self.timer.is_none() {
            return false;
        }
        self.timer = None;
        self.fired = true;
        true
    }

    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(timer) = self.timer.take() {
            scheduler.clear_timer(timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OrchestratorId;
    use crate::page_sim::{ProviderBehavior, SimulatedPage};

    fn token(generation: u64) -> CallbackToken {
        CallbackToken::new(
            OrchestratorId(0),
            GenerationId(generation),
            CallbackKind::FallbackDeadline,
        )
    }

    #[test]
    fn expires_once() {
        let mut page = SimulatedPage::new(ProviderBehavior::default());
        let mut timer = FallbackTimer::arm(&mut page, token(1), 0, 1_000);
        assert_eq!(timer.deadline_ms(), 1_000);
        assert!(timer.expire(GenerationId(1)));
        assert!(!timer.expire(GenerationId(1)));
        assert!(timer.has_fired());
    }

    #[test]
    fn other_generation_cannot_expire_it() {
        let mut page = SimulatedPage::new(ProviderBehavior::default());
        let mut timer = FallbackTimer::arm(&mut page, token(3), 0, 1_000);
        assert!(!timer.expire(GenerationId(2)));
        assert!(timer.is_armed());
    }

    #[test]
    fn cancelled_timer_never_expires() {
        let mut page = SimulatedPage::new(ProviderBehavior::default());
        let mut timer = FallbackTimer::arm(&mut page, token(1), 0, 1_000);
        timer.cancel(&mut page);
        assert!(!timer.expire(GenerationId(1)));
        assert_eq!(page.active_timer_count(), 0);
    }

    #[test]
    fn deadline_counts_from_generation_start() {
        let mut page = SimulatedPage::new(ProviderBehavior::default());
        page.run_until(400, &mut []);
        let timer = FallbackTimer::arm(&mut page, token(1), 100, 1_000);
        assert_eq!(timer.deadline_ms(), 1_100);
        assert_eq!(page.next_timer_due(), Some(1_100));
    }
}
