#![no_main]

use embed_lifecycle::host::{CallbackKind, CallbackToken};
use embed_lifecycle::page_sim::{ProviderBehavior, ScriptBehavior, SimulatedPage};
use embed_lifecycle::{
    EmbedConfig, GenerationId, LifecycleOrchestrator, OrchestratorId, ScriptReusePolicy,
};
use libfuzzer_sys::fuzz_target;

const MAX_STEPS: usize = 128;
const SCRIPT_URL: &str = "https://widgets.example/loader.js";

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    run_signal_program(data);
});

fn run_signal_program(data: &[u8]) {
    let delay = u64::from(byte(data, 1)) * 4;
    let script = match byte(data, 0) % 3 {
        0 => ScriptBehavior::LoadAfter { delay_ms: delay },
        1 => ScriptBehavior::FailAfter { delay_ms: delay },
        _ => ScriptBehavior::Never,
    };
    let mut page = SimulatedPage::new(ProviderBehavior {
        script,
        runtime_on_load: byte(data, 2) % 4 != 0,
        runtime_has_init: byte(data, 2) % 5 != 0,
        inject_after_init_ms: u64::from(byte(data, 3)),
        ..ProviderBehavior::default()
    })
    .with_render_delay(u64::from(byte(data, 3) % 8));

    let reuse = if byte(data, 0) % 2 == 0 {
        ScriptReusePolicy::Reuse
    } else {
        ScriptReusePolicy::ReplaceFailed
    };
    let config = EmbedConfig::new(
        SCRIPT_URL,
        "partner-fuzz",
        "widget-fuzz",
        "https://widgets.example/book",
    )
    .with_polling(50 + u64::from(byte(data, 1)), 1 + u32::from(byte(data, 2) % 8))
    .with_fallback_timeout(1_000)
    .with_script_reuse(reuse);

    let widgets = 1 + usize::from(byte(data, 3) % 3);
    let mut orchestrators = Vec::with_capacity(widgets);
    for n in 0..widgets {
        let Ok(orch) = LifecycleOrchestrator::new(OrchestratorId(n as u32), config.clone()) else {
            return;
        };
        orchestrators.push(orch);
    }

    let mut now = 0u64;
    for (step, op) in data.iter().skip(4).take(MAX_STEPS).enumerate() {
        let target = usize::from(op >> 4) % widgets;
        let orch = &mut orchestrators[target];
        match op % 12 {
            0 => {
                orch.mount(&mut page, "/");
            }
            1 => {
                orch.remount(&mut page);
            }
            2 => {
                let route = format!("/route/{}", op % 3);
                orch.route_changed(&mut page, &route);
            }
            3 => {
                orch.visibility_changed(&mut page, false);
            }
            4 => {
                orch.visibility_changed(&mut page, true);
            }
            5 => {
                orch.window_focused(&mut page);
            }
            6 => {
                orch.unmount(&mut page);
            }
            7 => page.clear_mount_content(),
            8 => page.remove_region(orch.id()),
            9 => {
                // Replay a callback for an arbitrary, possibly superseded generation.
                let generation = GenerationId(u64::from(op >> 5));
                let kind = match step % 4 {
                    0 => CallbackKind::PollTick,
                    1 => CallbackKind::FallbackDeadline,
                    2 => CallbackKind::ScriptLoaded,
                    _ => CallbackKind::ScriptFailed,
                };
                let owner = orch.id();
                let is_current = orch.current_generation().is_some_and(|g| g.id == generation);
                let before = orch.transition_log().len();
                orch.on_callback(&mut page, CallbackToken::new(owner, generation, kind));
                if !is_current {
                    assert_eq!(orch.transition_log().len(), before);
                }
            }
            _ => {
                now += u64::from(op % 64) * 25;
                let mut handles: Vec<&mut LifecycleOrchestrator> =
                    orchestrators.iter_mut().collect();
                page.run_until(now, &mut handles);
            }
        }
        check_invariants(&page, &orchestrators);
    }

    now += 200_000;
    let mut handles: Vec<&mut LifecycleOrchestrator> = orchestrators.iter_mut().collect();
    page.run_until(now, &mut handles);
    check_invariants(&page, &orchestrators);

    for orch in &mut orchestrators {
        orch.unmount(&mut page);
    }
    assert_eq!(page.active_timer_count(), 0);
    assert_eq!(page.script_listener_count(), 0);
    for orch in &orchestrators {
        assert_eq!(page.listener_count(orch.id()), 0);
        assert_eq!(page.live_mount_count(orch.id()), 0);
    }
}

fn check_invariants(page: &SimulatedPage, orchestrators: &[LifecycleOrchestrator]) {
    assert!(page.script_tag_count(SCRIPT_URL) <= 1);
    for orch in orchestrators {
        let owner = orch.id();
        assert!(page.live_mount_count(owner) <= 1);
        assert!(page.active_timers_for(owner) <= 2);
        assert!(orch.fallbacks_shown() <= orch.generations_issued());
        if !orch.is_mounted() {
            assert_eq!(page.active_timers_for(owner), 0);
            assert_eq!(page.listener_count(owner), 0);
        }
    }
}

fn byte(data: &[u8], index: usize) -> u8 {
    if data.is_empty() {
        return 0;
    }
    data[index % data.len()]
}
