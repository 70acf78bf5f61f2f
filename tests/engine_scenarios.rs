mod common;

use common::{
    settings, Harness, MemoryClipboard, RecordingPaste, RecordingSynth, ScriptedPointer,
    StubRegistrar,
};
use keysmash_rs::engine::{EngineEvent, TypingState, CLIPBOARD_INTERRUPT_KEYS};
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::sleep;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[tokio::test(start_paused = true)]
async fn clipboard_run_reports_progress_then_restores() {
    LocalSet::new()
        .run_until(async {
            let clipboard = MemoryClipboard::with("original");
            let paste = RecordingPaste::new(&clipboard);
            let mut harness = Harness::clipboard(
                &clipboard,
                &paste,
                StubRegistrar::default(),
                settings("Hi", 10, false),
            );

            assert!(harness.handle.start());
            sleep(Duration::from_secs(5)).await;

            let events: Vec<EngineEvent> = harness
                .drain_events()
                .into_iter()
                .filter(|event| *event != EngineEvent::HideWindow)
                .collect();
            assert_eq!(
                events,
                vec![
                    EngineEvent::TypingStatusChanged { typing: true },
                    EngineEvent::ClipboardProgress {
                        character: 'H',
                        position: 1,
                        total: 2
                    },
                    EngineEvent::ClipboardProgress {
                        character: 'i',
                        position: 2,
                        total: 2
                    },
                    EngineEvent::ClipboardRestored,
                    EngineEvent::TypingStatusChanged { typing: false },
                ]
            );
            assert_eq!(paste.typed(), "Hi");
            assert_eq!(clipboard.contents(), "original");
            assert_eq!(harness.handle.status(), TypingState::Idle);

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn first_character_waits_for_settle_delay() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let harness = Harness::synthesis(&synth, None, settings("ab", 100, false));

            harness.handle.start();
            sleep(ms(490)).await;
            assert_eq!(synth.typed(), "");

            sleep(ms(20)).await;
            assert_eq!(synth.typed(), "a");

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn nothing_is_typed_after_stop() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let harness = Harness::synthesis(&synth, None, settings("abcdefgh", 100, false));

            harness.handle.start();
            sleep(ms(750)).await;
            harness.handle.stop();
            let snapshot = harness.handle.snapshot().await.unwrap();
            assert_eq!(snapshot.state, TypingState::Idle);
            assert_eq!(snapshot.pending_timers, 0);
            assert_eq!(snapshot.interrupt_handles, 0);

            let typed_at_stop = synth.typed();
            assert_eq!(typed_at_stop, "abc");

            sleep(Duration::from_secs(3)).await;
            assert_eq!(synth.typed(), typed_at_stop);

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn looping_session_cycles_through_buffer() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let harness = Harness::synthesis(&synth, None, settings("abc", 10, true));

            harness.handle.start();
            sleep(ms(500 + 10 * 40)).await;
            harness.handle.stop();
            harness.handle.snapshot().await.unwrap();

            let typed: Vec<char> = synth.typed().chars().collect();
            let buffer: Vec<char> = "abc".chars().collect();
            assert!(typed.len() > 2 * buffer.len());
            for (k, ch) in typed.iter().enumerate() {
                assert_eq!(*ch, buffer[k % buffer.len()], "index {k}");
            }

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn clipboard_is_restored_when_cancelled_mid_run() {
    LocalSet::new()
        .run_until(async {
            let clipboard = MemoryClipboard::with("keep this");
            let paste = RecordingPaste::new(&clipboard);
            let mut harness = Harness::clipboard(
                &clipboard,
                &paste,
                StubRegistrar::default(),
                settings("Hello world", 100, false),
            );

            harness.handle.start();
            sleep(ms(1500 + 250)).await;
            assert_ne!(clipboard.contents(), "keep this");

            harness.handle.stop();
            harness.handle.snapshot().await.unwrap();
            assert_eq!(clipboard.contents(), "keep this");

            let typed = paste.typed();
            assert!(!typed.is_empty() && typed.len() < "Hello world".len());
            sleep(Duration::from_secs(3)).await;
            assert_eq!(paste.typed(), typed);
            assert_eq!(clipboard.contents(), "keep this");

            let events = harness.drain_events();
            assert!(events.contains(&EngineEvent::ClipboardRestored));
            assert!(!events.contains(&EngineEvent::ShowWindow));

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn start_while_typing_changes_nothing() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let mut harness = Harness::synthesis(&synth, None, settings("abcdef", 100, false));

            harness.handle.start();
            sleep(ms(520)).await;
            let before = harness.handle.snapshot().await.unwrap();
            harness.drain_events();

            harness.handle.start();
            let after = harness.handle.snapshot().await.unwrap();

            assert_eq!(before, after);
            assert_eq!(after.cursor, Some(1));
            assert_eq!(after.pending_timers, 1);
            assert!(harness.drain_events().is_empty());

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn blank_text_does_not_start() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let mut harness = Harness::synthesis(&synth, None, settings(" \n\t ", 10, false));

            harness.handle.start();
            let snapshot = harness.handle.snapshot().await.unwrap();
            assert_eq!(snapshot.state, TypingState::Idle);
            assert!(harness.drain_events().is_empty());

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn stop_from_idle_is_silent() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let mut harness = Harness::synthesis(&synth, None, settings("abc", 10, false));

            harness.handle.stop();
            harness.handle.stop();
            harness.handle.snapshot().await.unwrap();
            assert!(harness.drain_events().is_empty());

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn buffer_is_snapshotted_at_start() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let harness = Harness::synthesis(&synth, None, settings("abc", 10, false));

            harness.handle.start();
            harness.handle.snapshot().await.unwrap();
            harness.settings.send_modify(|settings| settings.text = "zzz".to_string());

            sleep(Duration::from_secs(2)).await;
            assert_eq!(synth.typed(), "abc");

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn pointer_movement_stops_before_first_character() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let pointer = ScriptedPointer::new(&[(0, 0), (5, 5), (100, 5)]);
            let mut harness = Harness::synthesis(&synth, Some(pointer), settings("abc", 10, false));

            harness.handle.start();
            sleep(Duration::from_secs(2)).await;

            assert_eq!(synth.typed(), "");
            assert_eq!(harness.handle.status(), TypingState::Idle);
            let events = harness.drain_events();
            assert_eq!(events.last(), Some(&EngineEvent::ShowWindow));

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn steady_pointer_lets_typing_finish() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let pointer = ScriptedPointer::new(&[(10, 10), (30, 40), (40, 20)]);
            let harness = Harness::synthesis(&synth, Some(pointer), settings("abc", 10, false));

            harness.handle.start();
            sleep(Duration::from_secs(2)).await;

            assert_eq!(synth.typed(), "abc");
            assert_eq!(harness.handle.status(), TypingState::Idle);

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn panic_hotkey_stops_and_raises_window() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let mut harness = Harness::synthesis(&synth, None, settings("abcdef", 100, false));

            harness.handle.start();
            sleep(ms(650)).await;

            let escape = harness.registrar.state.borrow().id_of("Escape");
            let escape = escape.expect("Escape registered while typing");
            harness.handle.hotkey(escape);
            harness.handle.snapshot().await.unwrap();

            assert_eq!(harness.handle.status(), TypingState::Idle);
            assert_eq!(synth.typed(), "ab");
            assert_eq!(harness.drain_events().last(), Some(&EngineEvent::ShowWindow));
            assert_eq!(harness.registrar.state.borrow().id_of("Escape"), None);

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn primary_hotkey_toggles_typing() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let harness = Harness::synthesis(&synth, None, settings("abcdef", 100, false));
            harness.handle.snapshot().await.unwrap();

            let primary = harness.registrar.state.borrow().id_of("Ctrl+Shift+T");
            let primary = primary.expect("primary hotkey registered at startup");

            harness.handle.hotkey(primary);
            harness.handle.snapshot().await.unwrap();
            assert_eq!(harness.handle.status(), TypingState::Typing);

            harness.handle.hotkey(primary);
            harness.handle.snapshot().await.unwrap();
            assert_eq!(harness.handle.status(), TypingState::Idle);

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn clipboard_mode_arms_interrupt_keys_without_paste() {
    LocalSet::new()
        .run_until(async {
            let clipboard = MemoryClipboard::with("");
            let paste = RecordingPaste::new(&clipboard);
            let registrar = StubRegistrar::failing(&["Alt+Tab"]);
            let harness = Harness::clipboard(
                &clipboard,
                &paste,
                registrar.clone(),
                settings("typing along", 100, false),
            );

            harness.handle.start();
            let snapshot = harness.handle.snapshot().await.unwrap();

            {
                let state = registrar.state.borrow();
                let live = state.live_accelerators();
                assert!(live.iter().all(|accel| !accel.to_uppercase().ends_with("+V")));
                assert!(live.contains(&"Escape".to_string()));
                assert!(live.contains(&"F12".to_string()));
                assert!(!live.contains(&"Alt+Tab".to_string()));
                assert_eq!(live.len(), 1 + 1 + CLIPBOARD_INTERRUPT_KEYS.len() - 1);
            }
            assert_eq!(snapshot.interrupt_handles, 1 + CLIPBOARD_INTERRUPT_KEYS.len() - 1);

            let f5 = registrar.state.borrow().id_of("F5");
            harness.handle.hotkey(f5.expect("F5 armed"));
            harness.handle.snapshot().await.unwrap();
            assert_eq!(harness.handle.status(), TypingState::Idle);

            {
                let state = registrar.state.borrow();
                assert_eq!(state.live_accelerators(), vec!["Ctrl+Shift+T".to_string()]);
                let primary_registrations = state
                    .registered
                    .iter()
                    .filter(|accel| accel.as_str() == "Ctrl+Shift+T")
                    .count();
                assert_eq!(primary_registrations, 2);
            }

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn synthesis_failure_ends_session_quietly() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::failing_after(2);
            let mut harness = Harness::synthesis(&synth, None, settings("abcdef", 10, false));

            harness.handle.start();
            sleep(Duration::from_secs(2)).await;

            assert_eq!(synth.typed(), "ab");
            assert_eq!(harness.handle.status(), TypingState::Idle);
            let events = harness.drain_events();
            assert_eq!(
                events.last(),
                Some(&EngineEvent::TypingStatusChanged { typing: false })
            );

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn failed_pastes_do_not_abort_the_run() {
    LocalSet::new()
        .run_until(async {
            let clipboard = MemoryClipboard::with("before");
            let paste = RecordingPaste::failing(&clipboard);
            let mut harness = Harness::clipboard(
                &clipboard,
                &paste,
                StubRegistrar::default(),
                settings("abc", 10, false),
            );

            harness.handle.start();
            sleep(Duration::from_secs(5)).await;

            let progress = harness
                .drain_events()
                .into_iter()
                .filter(|event| matches!(event, EngineEvent::ClipboardProgress { .. }))
                .count();
            assert_eq!(progress, 3);
            assert_eq!(clipboard.contents(), "before");
            assert_eq!(harness.handle.status(), TypingState::Idle);

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn rebinding_swaps_the_primary_hotkey() {
    LocalSet::new()
        .run_until(async {
            let synth = RecordingSynth::default();
            let harness = Harness::synthesis(&synth, None, settings("abc", 10, false));

            harness.handle.rebind("Alt+K").await.unwrap();
            assert_eq!(
                harness.registrar.state.borrow().live_accelerators(),
                vec!["Alt+K".to_string()]
            );

            assert!(harness.handle.rebind("Alt+Nope").await.is_err());
            assert!(harness.registrar.state.borrow().live.is_empty());

            harness.shutdown().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_an_active_session() {
    LocalSet::new()
        .run_until(async {
            let clipboard = MemoryClipboard::with("saved");
            let paste = RecordingPaste::new(&clipboard);
            let harness = Harness::clipboard(
                &clipboard,
                &paste,
                StubRegistrar::default(),
                settings("long text here", 100, true),
            );

            harness.handle.start();
            sleep(ms(1700)).await;
            let registrar = harness.registrar.clone();
            harness.shutdown().await;

            assert_eq!(clipboard.contents(), "saved");
            assert!(registrar.state.borrow().live.is_empty());
        })
        .await;
}
