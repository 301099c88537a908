#![forbid(unsafe_code)]
//! Integration tests for recovery paths: tab revisits, SPA navigation,
//! explicit remounts after a failed script, and the event hook.

use std::cell::RefCell;
use std::rc::Rc;

use embed_lifecycle::page_sim::{ProviderBehavior, ScriptBehavior, SimAction, SimulatedPage};
use embed_lifecycle::{
    EmbedConfig, EmbedEvent, GenerationState, GenerationTrigger, LifecycleOrchestrator,
    OrchestratorId, RecoveryAction, ScriptReusePolicy,
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

fn orchestrator() -> LifecycleOrchestrator {
    LifecycleOrchestrator::new(OrchestratorId(0), config()).unwrap()
}

/// Mounted widget whose frame has been injected.
fn ready_widget() -> (SimulatedPage, LifecycleOrchestrator) {
    let mut page = SimulatedPage::new(ProviderBehavior::default());
    let mut orch = orchestrator();
    orch.mount(&mut page, "/tours/9");
    page.run_until(500, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
    let content = page.mount_content(orch.current_key().unwrap()).unwrap();
    assert!(content.has_frame());
    (page, orch)
}

// ---------------------------------------------------------------------------
// Visibility recovery
// ---------------------------------------------------------------------------

#[test]
fn revisit_with_frame_only_refreshes_it() {
    let (mut page, mut orch) = ready_widget();
    assert_eq!(orch.visibility_changed(&mut page, false), RecoveryAction::None);
    assert_eq!(
        orch.visibility_changed(&mut page, true),
        RecoveryAction::RefreshFrame
    );
    assert_eq!(page.frame_refreshes(), 1);
    assert_eq!(orch.generations_issued(), 1);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
}

#[test]
fn revisit_with_empty_mount_remounts() {
    let (mut page, mut orch) = ready_widget();
    orch.visibility_changed(&mut page, false);
    page.clear_mount_content();
    assert_eq!(
        orch.visibility_changed(&mut page, true),
        RecoveryAction::Remount
    );
    assert_eq!(orch.generations_issued(), 2);
    assert_eq!(page.frame_refreshes(), 0);

    page.run_until(1_000, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
    assert_eq!(page.script_tag_count(SCRIPT_URL), 1);
    assert!(page.mount_content(orch.current_key().unwrap()).unwrap().has_frame());
}

#[test]
fn focus_without_hide_leaves_frame_alone() {
    let (mut page, mut orch) = ready_widget();
    assert_eq!(orch.window_focused(&mut page), RecoveryAction::None);
    assert_eq!(page.frame_refreshes(), 0);

    page.clear_mount_content();
    assert_eq!(orch.window_focused(&mut page), RecoveryAction::Remount);
}

#[test]
fn focus_stands_in_for_missed_visibility_event() {
    let (mut page, mut orch) = ready_widget();
    orch.visibility_changed(&mut page, false);
    assert_eq!(orch.window_focused(&mut page), RecoveryAction::RefreshFrame);
    // The late `visible` event is not a second revisit.
    assert_eq!(orch.visibility_changed(&mut page, true), RecoveryAction::None);
    assert_eq!(page.frame_refreshes(), 1);
}

#[test]
fn revisit_while_polling_with_empty_mount_remounts() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        runtime_on_load: false,
        ..ProviderBehavior::default()
    });
    let mut orch = orchestrator();
    let first = orch.mount(&mut page, "/").unwrap();
    page.run_until(150, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Polling));
    assert!(page.mount_content(orch.current_key().unwrap()).unwrap().is_empty());

    orch.visibility_changed(&mut page, false);
    assert_eq!(orch.visibility_changed(&mut page, true), RecoveryAction::Remount);
    assert_eq!(orch.generations_issued(), 2);
    assert!(orch.current_generation().unwrap().id > first);
    assert_eq!(
        orch.transition_log()
            .iter()
            .filter(|r| r.generation == first)
            .map(|r| r.trigger)
            .last(),
        Some(GenerationTrigger::Supersede)
    );
}

#[test]
fn revisit_while_loading_with_empty_mount_remounts() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        script: ScriptBehavior::Never,
        ..ProviderBehavior::default()
    });
    let mut orch = orchestrator();
    orch.mount(&mut page, "/");
    page.run_until(0, &mut [&mut orch]);
    orch.visibility_changed(&mut page, false);
    assert_eq!(orch.visibility_changed(&mut page, true), RecoveryAction::Remount);
    assert_eq!(orch.generations_issued(), 2);

    page.run_until(0, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::ScriptLoading));
    assert_eq!(page.script_tag_count(SCRIPT_URL), 1);
}

#[test]
fn failed_generation_with_empty_mount_recovers_on_revisit() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        script: ScriptBehavior::Never,
        ..ProviderBehavior::default()
    });
    let mut orch = orchestrator();
    orch.mount(&mut page, "/");
    page.run_until(1_000, &mut [&mut orch]);
    assert!(orch.show_fallback());

    page.schedule(1_100, SimAction::Hide);
    page.schedule(1_200, SimAction::Show);
    page.run_until(1_200, &mut [&mut orch]);
    assert_eq!(orch.generations_issued(), 2);
    assert!(!orch.show_fallback());
    assert_eq!(orch.state(), Some(GenerationState::ScriptLoading));
}

#[test]
fn page_events_reach_only_listening_widgets() {
    let (mut page, mut orch) = ready_widget();
    let mut detached = LifecycleOrchestrator::new(OrchestratorId(5), config()).unwrap();
    page.schedule(600, SimAction::Hide);
    page.schedule(700, SimAction::Show);
    page.run_until(700, &mut [&mut orch, &mut detached]);
    assert_eq!(page.frame_refreshes(), 1);
    assert!(detached.events().is_empty());
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[test]
fn route_change_remounts_and_same_route_does_not() {
    let (mut page, mut orch) = ready_widget();
    let first = orch.current_generation().unwrap().id;
    assert_eq!(orch.route_changed(&mut page, "/tours/9"), None);

    let second = orch.route_changed(&mut page, "/tours/12").unwrap();
    assert!(second > first);
    assert_eq!(orch.route(), Some("/tours/12"));
    assert_eq!(
        orch.transition_log()
            .iter()
            .filter(|r| r.generation == first)
            .map(|r| r.trigger)
            .last(),
        Some(GenerationTrigger::Supersede)
    );

    page.run_until(1_500, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Ready));
    assert_eq!(page.live_mount_count(OrchestratorId(0)), 1);
    assert_eq!(page.script_tag_count(SCRIPT_URL), 1);
}

#[test]
fn scheduled_navigation_reaches_every_widget() {
    let mut page = SimulatedPage::new(ProviderBehavior::default());
    let mut a = orchestrator();
    let mut b = LifecycleOrchestrator::new(OrchestratorId(1), config()).unwrap();
    a.mount(&mut page, "/a");
    b.mount(&mut page, "/a");
    page.schedule(
        300,
        SimAction::Navigate {
            route: "/b".to_string(),
        },
    );
    page.run_until(1_000, &mut [&mut a, &mut b]);
    assert_eq!(a.generations_issued(), 2);
    assert_eq!(b.generations_issued(), 2);
    assert_eq!(a.state(), Some(GenerationState::Ready));
    assert_eq!(b.state(), Some(GenerationState::Ready));
}

// ---------------------------------------------------------------------------
// Failed script reuse policy
// ---------------------------------------------------------------------------

#[test]
fn reuse_policy_keeps_failed_tag() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        script: ScriptBehavior::FailAfter { delay_ms: 50 },
        ..ProviderBehavior::default()
    });
    let mut orch = orchestrator();
    orch.mount(&mut page, "/");
    page.run_until(100, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Failed));

    orch.remount(&mut page);
    page.run_until(200, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::Failed));
    assert_eq!(page.scripts_inserted(), 1);
}

#[test]
fn replace_failed_policy_inserts_one_replacement() {
    let mut page = SimulatedPage::new(ProviderBehavior {
        script: ScriptBehavior::FailAfter { delay_ms: 50 },
        ..ProviderBehavior::default()
    });
    let cfg = config().with_script_reuse(ScriptReusePolicy::ReplaceFailed);
    let mut orch = LifecycleOrchestrator::new(OrchestratorId(0), cfg).unwrap();
    orch.mount(&mut page, "/");
    page.run_until(100, &mut [&mut orch]);

    orch.remount(&mut page);
    page.run_until(110, &mut [&mut orch]);
    assert_eq!(orch.state(), Some(GenerationState::ScriptLoading));
    assert_eq!(page.scripts_inserted(), 2);
    assert_eq!(page.script_tag_count(SCRIPT_URL), 1);
}

// ---------------------------------------------------------------------------
// Event hook
// ---------------------------------------------------------------------------

#[test]
fn observer_sees_the_same_stream_as_the_buffer() {
    let seen: Rc<RefCell<Vec<EmbedEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut page = SimulatedPage::new(ProviderBehavior::default());
    let mut orch = orchestrator().with_observer(move |event: &EmbedEvent| {
        sink.borrow_mut().push(event.clone());
    });
    orch.mount(&mut page, "/");
    page.run_until(500, &mut [&mut orch]);

    let drained = orch.drain_events();
    assert!(!drained.is_empty());
    assert_eq!(*seen.borrow(), drained);
    assert!(orch.events().is_empty());
    assert!(drained.iter().all(|e| e.component == "embed_lifecycle"));
    assert!(drained.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[test]
fn events_serialize_to_json() {
    let (_page, mut orch) = ready_widget();
    let events = orch.drain_events();
    let json = serde_json::to_string(&events).unwrap();
    let back: Vec<EmbedEvent> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, events);
    let ready = back
        .iter()
        .find(|e| e.event == "provider_ready")
        .unwrap();
    assert_eq!(ready.to_state, Some(GenerationState::Ready));
}
