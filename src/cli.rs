use clap::{Parser, Subcommand, ValueEnum};

use crate::settings::SettingsUpdate;

#[derive(Parser)]
#[command(
    name = "keysmash-rs",
    version,
    about = "Types a stored text buffer into the focused application on a global hotkey"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file to use instead of the default location. Client commands
    /// edit this file directly when no engine is running.
    #[arg(long, global = true)]
    pub settings: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the typing engine (default)
    Run(RunArgs),
    /// Ask the running engine to start typing
    Start,
    /// Ask the running engine to stop typing
    Stop,
    /// Start typing if idle, stop if typing
    Toggle,
    /// Print whether the engine is typing
    Status,
    /// Show the stored settings
    Settings,
    /// Update stored settings; the running engine rebinds its hotkey
    Set(SetArgs),
    /// Manage the submitted-text history
    #[command(subcommand)]
    History(HistoryCommand),
    /// Stream engine events as JSON lines
    Watch,
    /// Check for a newer release now
    CheckUpdate,
}

#[derive(clap::Args, Default)]
pub struct RunArgs {
    /// Injection strategy; `auto` prefers keystroke synthesis when available
    #[arg(long, value_enum, default_value_t = StrategyChoice::Auto)]
    pub strategy: StrategyChoice,

    /// Disable the periodic update check
    #[arg(long)]
    pub no_update_check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StrategyChoice {
    #[default]
    Auto,
    Synthesis,
    Clipboard,
}

#[derive(clap::Args)]
pub struct SetArgs {
    /// Text to type
    #[arg(long)]
    pub text: Option<String>,

    /// Delay between characters in milliseconds
    #[arg(long)]
    pub delay: Option<u64>,

    /// Restart from the beginning after the last character
    #[arg(long = "loop")]
    pub loop_typing: Option<bool>,

    /// Start/stop hotkey, e.g. Ctrl+Shift+T
    #[arg(long)]
    pub hotkey: Option<String>,
}

impl SetArgs {
    pub fn into_update(self) -> SettingsUpdate {
        SettingsUpdate {
            text: self.text,
            delay: self.delay,
            loop_typing: self.loop_typing,
            hotkey: self.hotkey,
        }
    }
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// Record a text in the history
    Add {
        text: String,
    },
    /// List the history, most recent first
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_runs_engine() {
        let cli = Cli::parse_from(["keysmash-rs"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "keysmash-rs",
            "-vv",
            "run",
            "--strategy",
            "clipboard",
            "--no-update-check",
        ]);
        assert_eq!(cli.verbose, 2);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.strategy, StrategyChoice::Clipboard);
        assert!(args.no_update_check);
    }

    #[test]
    fn set_accepts_partial_updates() {
        let cli = Cli::parse_from(["keysmash-rs", "set", "--delay", "20", "--loop", "true"]);
        let Some(Command::Set(args)) = cli.command else {
            panic!("expected set");
        };
        assert_eq!(args.delay, Some(20));
        assert_eq!(args.loop_typing, Some(true));
        assert!(args.text.is_none());
        assert!(!args.into_update().is_empty());
    }

    #[test]
    fn bare_set_is_an_empty_update() {
        let cli = Cli::parse_from(["keysmash-rs", "set"]);
        let Some(Command::Set(args)) = cli.command else {
            panic!("expected set");
        };
        assert!(args.into_update().is_empty());
    }

    #[test]
    fn settings_path_applies_to_client_commands() {
        let cli = Cli::parse_from(["keysmash-rs", "set", "--delay", "5", "--settings", "~/x.json"]);
        assert_eq!(cli.settings.as_deref(), Some("~/x.json"));

        let cli = Cli::parse_from(["keysmash-rs", "--settings", "/tmp/k.json", "run"]);
        assert_eq!(cli.settings.as_deref(), Some("/tmp/k.json"));
        assert!(matches!(cli.command, Some(Command::Run(_))));
    }
}
