#![forbid(unsafe_code)]
//! Integration tests for the widget lifecycle.
//!
//! Drives `LifecycleOrchestrator` through the public API on a
//! `SimulatedPage`: shared script acquisition, generation identity, stale
//! callbacks, the fallback deadline and teardown.

use embed_lifecycle::host::{CallbackKind, CallbackToken};
use embed_lifecycle::page_sim::{ProviderBehavior, ScriptBehavior, SimulatedPage};
use embed_lifecycle::{
    EmbedConfig, GenerationId, GenerationState, GenerationTrigger, LifecycleOrchestrator, MountKey,
    OrchestratorId,
};

const SCRIPT_URL: &str = "https://widgets.example/loader.js";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> EmbedConfig {
    EmbedConfig::new(
        SCRIPT_URL,
        "partner-1",
        "tour-9",
        "https://widgets.example/book/tour-9",
    )
    .with_polling(100, 3)
    .with_fallback_timeout(1_000)
}

fn orchestrator(n: u32) -> LifecycleOrchestrator {
    LifecycleOrchestrator::new(OrchestratorId(n), config()).unwrap()
}

fn page(script: ScriptBehavior) -> SimulatedPage {
    SimulatedPage::new(ProviderBehavior {
        script,
        ..ProviderBehavior::default()
    })
}

fn triggers(orch: &LifecycleOrchestrator, generation: GenerationId) -> Vec<GenerationTrigger> {
    orch.transition_log()
        .iter()
        .filter(|r| r.generation == generation)
        .map(|r| r.trigger)
        .collect()
}

fn error_count(orch: &LifecycleOrchestrator, code: &str) -> usize {
    orch.events()
        .iter()
        .filter(|e| e.error_code.as_deref() == Some(code))
        .count()
}

// ---------------------------------------------------------------------------
// Late runtime: ticks at 100/200/300, ready on the third
// ---------------------------------------------------------------------------

#[test]
fn late_runtime_is_found_on_third_tick() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        script: ScriptBehavior::LoadAfter { delay_ms: 0 },
        runtime_on_load: false,
        ..ProviderBehavior::default()
    });
    page.schedule_runtime_install(250);
    let mut orch = orchestrator(0);
    let generation = orch.mount(&mut page, "/tours/9").unwrap();

    page.run_until(100, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Polling));
    assert_eq!(orch.snapshot().poll_attempts, 1);

    page.run_until(200, &mut [&mut orch]);
    assert_eq!(orch.snapshot().poll_attempts, 2);
    assert_eq!(page.init_calls(), 0);

    page.run_until(300, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
    assert_eq!(orch.snapshot().poll_attempts, 3);
    assert_eq!(page.init_calls(), 1);

    page.run_until(5_000, &mut [&mut orch]);
    assert!(!orch.show_fallback());
    assert_eq!(orch.fallbacks_shown(), 0);
    assert_eq!(page.active_timer_count(), 0);
    assert_eq!(
        triggers(&orch, generation),
        vec![
            GenerationTrigger::Attach,
            GenerationTrigger::ScriptLoaded,
            GenerationTrigger::ProviderReady
        ]
    );
}

#[test]
fn provider_injects_frame_after_init() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/");
    page.run_until(500, &mut [&mut orch]);
    let key = orch.current_key().unwrap();
    let content = page.mount_content(key).unwrap();
    assert!(content.has_frame());
    assert!(content.frame_src.unwrap().contains("partner=partner-1"));
    assert!(page.dispatched_events().is_empty());
}

// ---------------------------------------------------------------------------
// Idempotent script insertion
// ---------------------------------------------------------------------------

#[test]
fn many_widgets_insert_one_script() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut a = orchestrator(0);
    let mut b = orchestrator(1);
    let mut c = orchestrator(2);
    a.mount(&mut page, "/");
    b.mount(&mut page, "/");
    c.mount(&mut page, "/");
    page.run_until(10, &mut [&mut a, &mut b, &mut c]);
    assert_eq!(page.script_tag_count(SCRIPT_URL), 1);
    // Two subscribers share the tag the first one inserted.
    assert_eq!(page.script_listener_count(), 3);

    page.run_until(500, &mut [&mut a, &mut b, &mut c]);
    for orch in [&a, &b, &c] {
        assert_eq!(orch.state(), Some(GenerationState::Ready));
    }

    for _ in 0..4 {
        a.remount(&mut page);
        b.remount(&mut page);
    }
    page.run_until(1_000, &mut [&mut a, &mut b, &mut c]);
    assert_eq!(page.script_tag_count(SCRIPT_URL), 1);
    assert_eq!(page.scripts_inserted(), 1);
    assert_eq!(a.state(), Some(GenerationState::Ready));
}

// ---------------------------------------------------------------------------
// Generation identity
// ---------------------------------------------------------------------------

#[test]
fn generations_increase_and_only_one_is_live() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut orch = orchestrator(0);
    let mut previous = orch.mount(&mut page, "/").unwrap();
    for step in 1..=5u64 {
        page.run_until(step * 40, &mut [&mut orch]);
        assert!(page.live_mount_count(OrchestratorId(0)) <= 1);
        let next = orch.remount(&mut page).unwrap();
        assert!(next > previous);
        assert_eq!(triggers(&orch, previous).last(), Some(&GenerationTrigger::Supersede));
        previous = next;
    }
    page.run_until(2_000, &mut [&mut orch]);
    assert_eq!(page.live_mount_count(OrchestratorId(0)), 1);
    assert_eq!(orch.generations_issued(), 6);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
}

#[test]
fn stale_callbacks_change_nothing() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut orch = orchestrator(0);
    let old = orch.mount(&mut page, "/").unwrap();
    page.run_until(0, &mut [&mut orch]);
    orch.remount(&mut page);
    page.run_until(0, &mut [&mut orch]);

    let mutations = page.dom_mutation_count();
    let transitions = orch.transition_log().len();
    let state = orch.state();
    let owner = OrchestratorId(0);
    for kind in [
        CallbackKind::PollTick,
        CallbackKind::FallbackDeadline,
        CallbackKind::ScriptLoaded,
        CallbackKind::ScriptFailed,
    ] {
        orch.on_callback(&mut page, CallbackToken::new(owner, old, kind));
    }
    orch.mount_rendered(
        &mut page,
        MountKey {
            owner,
            generation: old,
        },
    );

    assert_eq!(page.dom_mutation_count(), mutations);
    assert_eq!(orch.transition_log().len(), transitions);
    assert_eq!(orch.state(), state);
    assert!(!orch.show_fallback());
    assert_eq!(error_count(&orch, "EMBED_STALE_CALLBACK"), 5);
}

#[test]
fn callbacks_for_another_widget_are_stale() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut orch = orchestrator(0);
    let generation = orch.mount(&mut page, "/").unwrap();
    page.run_until(0, &mut [&mut orch]);
    orch.on_callback(
        &mut page,
        CallbackToken::new(OrchestratorId(7), generation, CallbackKind::ScriptLoaded),
    );
    assert_eq!(orch.state(), Some(GenerationState::ScriptLoading));
    assert_eq!(error_count(&orch, "EMBED_STALE_CALLBACK"), 1);
}

// ---------------------------------------------------------------------------
// Fallback deadline
// ---------------------------------------------------------------------------

#[test]
fn never_loading_script_falls_back_at_deadline_once() {
    let mut page = page(ScriptBehavior::Never);
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/");
    page.run_until(999, &mut [&mut orch]);
    assert!(!orch.show_fallback());
    assert_eq!(orch.state(), Some(GenerationState::ScriptLoading));

    page.run_until(1_000, &mut [&mut orch]);
    assert!(orch.show_fallback());
    assert_eq!(orch.fallback_url(), "https://widgets.example/book/tour-9");
    assert_eq!(orch.state(), Some(GenerationState::Failed));

    page.run_until(10_000, &mut [&mut orch]);
    assert_eq!(orch.fallbacks_shown(), 1);
    assert_eq!(page.active_timer_count(), 0);
    assert_eq!(page.script_listener_count(), 0);
}

#[test]
fn runtime_without_init_exhausts_then_falls_back() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        runtime_has_init: false,
        ..ProviderBehavior::default()
    });
    let mut orch = orchestrator(0);
    let generation = orch.mount(&mut page, "/").unwrap();
    // Script loads at 30; polls at 130, 230, 330.
    page.run_until(330, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Failed));
    assert_eq!(error_count(&orch, "EMBED_PROVIDER_NEVER_READY"), 1);
    assert!(!orch.show_fallback());
    assert_eq!(
        triggers(&orch, generation).last(),
        Some(&GenerationTrigger::PollExhausted)
    );

    page.run_until(1_000, &mut [&mut orch]);
    assert!(orch.show_fallback());
    assert_eq!(page.init_calls(), 0);
}

#[test]
fn each_generation_gets_its_own_fallback() {
    let mut page = page(ScriptBehavior::Never);
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/");
    page.run_until(1_000, &mut [&mut orch]);
    assert!(orch.show_fallback());

    orch.remount(&mut page);
    assert!(!orch.show_fallback());
    page.run_until(1_999, &mut [&mut orch]);
    assert!(!orch.show_fallback());
    page.run_until(2_000, &mut [&mut orch]);
    assert!(orch.show_fallback());
    assert_eq!(orch.fallbacks_shown(), 2);
}

#[test]
fn ready_generation_never_falls_back() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/");
    page.run_until(20_000, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
    assert!(!orch.show_fallback());
    assert_eq!(orch.fallbacks_shown(), 0);
}

#[test]
fn missing_container_is_ignored_until_deadline() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/");
    page.run_until(0, &mut [&mut orch]);
    page.remove_region(OrchestratorId(0));

    page.run_until(500, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::ScriptLoading));
    assert!(error_count(&orch, "EMBED_CONTAINER_MISSING") >= 1);

    page.run_until(1_000, &mut [&mut orch]);
    assert!(orch.show_fallback());
    assert_eq!(orch.state(), Some(GenerationState::Failed));
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[test]
fn unmount_while_polling_leaves_nothing_behind() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        runtime_on_load: false,
        ..ProviderBehavior::default()
    });
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/");
    page.run_until(250, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Polling));
    assert_eq!(page.active_timer_count(), 2);
    assert_eq!(page.listener_count(OrchestratorId(0)), 2);

    assert!(orch.unmount(&mut page));
    assert_eq!(page.active_timer_count(), 0);
    assert_eq!(page.listener_count(OrchestratorId(0)), 0);
    assert_eq!(page.script_listener_count(), 0);
    assert_eq!(page.live_mount_count(OrchestratorId(0)), 0);
    assert!(!orch.is_mounted());
    assert!(orch.state().is_none());

    page.run_until(10_000, &mut [&mut orch]);
    assert!(!orch.show_fallback());
    assert!(!orch.unmount(&mut page));
}

#[test]
fn unmount_while_loading_releases_script_listener() {
    let mut page = page(ScriptBehavior::Never);
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/");
    page.run_until(0, &mut [&mut orch]);
    assert_eq!(page.script_listener_count(), 1);
    orch.unmount(&mut page);
    assert_eq!(page.script_listener_count(), 0);
    // The shared tag stays for other widgets.
    assert_eq!(page.script_tag_count(SCRIPT_URL), 1);
}

#[test]
fn remount_after_unmount_starts_fresh() {
    let mut page = page(ScriptBehavior::LoadAfter { delay_ms: 30 });
    let mut orch = orchestrator(0);
    orch.mount(&mut page, "/a");
    page.run_until(500, &mut [&mut orch]);
    orch.unmount(&mut page);
    assert_eq!(orch.remount(&mut page), None);

    let generation = orch.mount(&mut page, "/b").unwrap();
    assert_eq!(generation, GenerationId(2));
    page.run_until(1_000, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
    assert_eq!(orch.route(), Some("/b"));
}
