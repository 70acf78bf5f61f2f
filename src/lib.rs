pub mod app;
pub mod cli;
pub mod control;
pub mod engine;
pub mod input;
pub mod logging;
pub mod paths;
pub mod report;
pub mod settings;
pub mod status;
pub mod update;

pub use app::KeysmashApp;
pub use engine::{EngineHandle, TypingEngine};
pub use settings::{Settings, SettingsStore};
pub use status::StatusWriter;
