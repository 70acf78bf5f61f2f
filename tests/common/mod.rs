#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use keysmash_rs::engine::{
    ClipboardInjector, EngineEvent, EngineHandle, EngineParts, SynthesisInjector, TypingEngine,
};
use keysmash_rs::input::{
    parse_accelerator, ClipboardAccess, HotkeyRegistrar, HotkeyRegistry, KeystrokeSynth,
    PasteCommand, PointerSource,
};
use keysmash_rs::update::UpdateSources;
use keysmash_rs::Settings;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub fn settings(text: &str, delay: u64, looping: bool) -> Settings {
    Settings {
        text: text.to_string(),
        delay,
        loop_typing: looping,
        hotkey: "Ctrl+Shift+T".to_string(),
        ..Settings::default()
    }
}

/// Publishes `version` as the latest release on a local HTTP server.
pub async fn serve_release(version: &'static str, changelog: &'static str) -> UpdateSources {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            let body = if buf[..n].starts_with(b"GET /version") {
                version
            } else {
                changelog
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    UpdateSources {
        version_url: format!("http://{addr}/version"),
        changelog_url: format!("http://{addr}/changelog"),
    }
}

#[derive(Clone, Default)]
pub struct MemoryClipboard {
    contents: Rc<RefCell<String>>,
}

impl MemoryClipboard {
    pub fn with(text: &str) -> Self {
        let clipboard = Self::default();
        *clipboard.contents.borrow_mut() = text.to_string();
        clipboard
    }

    pub fn contents(&self) -> String {
        self.contents.borrow().clone()
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn read_text(&mut self) -> Result<String> {
        Ok(self.contents.borrow().clone())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        *self.contents.borrow_mut() = text.to_string();
        Ok(())
    }
}

/// Pastes whatever the clipboard holds into a shared "document".
#[derive(Clone)]
pub struct RecordingPaste {
    clipboard: MemoryClipboard,
    typed: Rc<RefCell<String>>,
    fail: bool,
}

impl RecordingPaste {
    pub fn new(clipboard: &MemoryClipboard) -> Self {
        Self {
            clipboard: clipboard.clone(),
            typed: Rc::default(),
            fail: false,
        }
    }

    pub fn failing(clipboard: &MemoryClipboard) -> Self {
        Self {
            fail: true,
            ..Self::new(clipboard)
        }
    }

    pub fn typed(&self) -> String {
        self.typed.borrow().clone()
    }
}

#[async_trait(?Send)]
impl PasteCommand for RecordingPaste {
    async fn paste(&self) -> Result<()> {
        if self.fail {
            return Err(anyhow!("xdotool: command not found"));
        }
        self.typed
            .borrow_mut()
            .push_str(&self.clipboard.contents());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingSynth {
    typed: Rc<RefCell<String>>,
    fail_after: Option<usize>,
}

impl RecordingSynth {
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::default()
        }
    }

    pub fn typed(&self) -> String {
        self.typed.borrow().clone()
    }
}

impl KeystrokeSynth for RecordingSynth {
    fn type_char(&mut self, ch: char) -> Result<()> {
        let mut typed = self.typed.borrow_mut();
        if self.fail_after == Some(typed.chars().count()) {
            return Err(anyhow!("input backend went away"));
        }
        typed.push(ch);
        Ok(())
    }
}

/// Replays a fixed list of positions, then keeps reporting the last one.
pub struct ScriptedPointer {
    positions: VecDeque<(i32, i32)>,
    last: (i32, i32),
}

impl ScriptedPointer {
    pub fn new(positions: &[(i32, i32)]) -> Self {
        Self {
            positions: positions.iter().copied().collect(),
            last: positions.first().copied().unwrap_or_default(),
        }
    }
}

impl PointerSource for ScriptedPointer {
    fn location(&mut self) -> Result<(i32, i32)> {
        if let Some(next) = self.positions.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }
}

#[derive(Debug, Default)]
pub struct RegistrarState {
    next_id: u32,
    pub live: BTreeMap<u32, String>,
    pub registered: Vec<String>,
    pub failing: HashSet<String>,
}

impl RegistrarState {
    pub fn id_of(&self, accelerator: &str) -> Option<u32> {
        self.live
            .iter()
            .find(|(_, accel)| accel.as_str() == accelerator)
            .map(|(id, _)| *id)
    }

    pub fn live_accelerators(&self) -> Vec<String> {
        self.live.values().cloned().collect()
    }
}

#[derive(Clone, Default)]
pub struct StubRegistrar {
    pub state: Rc<RefCell<RegistrarState>>,
}

impl StubRegistrar {
    pub fn failing(keys: &[&str]) -> Self {
        let registrar = Self::default();
        registrar
            .state
            .borrow_mut()
            .failing
            .extend(keys.iter().map(|key| key.to_string()));
        registrar
    }
}

impl HotkeyRegistrar for StubRegistrar {
    fn register(&mut self, accelerator: &str) -> Result<u32> {
        parse_accelerator(accelerator)?;
        let mut state = self.state.borrow_mut();
        if state.failing.contains(accelerator) {
            return Err(anyhow!("{accelerator} is already taken"));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, accelerator.to_string());
        state.registered.push(accelerator.to_string());
        Ok(id)
    }

    fn unregister(&mut self, id: u32) -> Result<()> {
        self.state.borrow_mut().live.remove(&id);
        Ok(())
    }
}

pub struct Harness {
    pub handle: EngineHandle,
    pub events: broadcast::Receiver<EngineEvent>,
    pub settings: watch::Sender<Settings>,
    pub registrar: StubRegistrar,
    task: JoinHandle<()>,
}

impl Harness {
    /// Must be called inside a `LocalSet`.
    pub fn spawn(parts: EngineParts, registrar: StubRegistrar, settings: Settings) -> Self {
        let (tx, rx) = watch::channel(settings);
        let (engine, handle) = TypingEngine::new(parts, rx);
        let events = handle.subscribe();
        let task = tokio::task::spawn_local(engine.run());
        Self {
            handle,
            events,
            settings: tx,
            registrar,
            task,
        }
    }

    pub fn synthesis(synth: &RecordingSynth, pointer: Option<ScriptedPointer>, settings: Settings) -> Self {
        let registrar = StubRegistrar::default();
        let parts = EngineParts {
            injector: Box::new(SynthesisInjector::new(synth.clone())),
            hotkeys: HotkeyRegistry::new(Box::new(registrar.clone())),
            pointer: pointer.map(|p| Box::new(p) as Box<dyn PointerSource>),
        };
        Self::spawn(parts, registrar, settings)
    }

    pub fn clipboard(
        clipboard: &MemoryClipboard,
        paste: &RecordingPaste,
        registrar: StubRegistrar,
        settings: Settings,
    ) -> Self {
        let parts = EngineParts {
            injector: Box::new(ClipboardInjector::new(clipboard.clone(), paste.clone())),
            hotkeys: HotkeyRegistry::new(Box::new(registrar.clone())),
            pointer: None,
        };
        Self::spawn(parts, registrar, settings)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn shutdown(self) {
        self.handle.shutdown();
        self.task.await.expect("engine task panicked");
    }
}
