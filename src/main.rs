use anyhow::{bail, Result};
use clap::Parser;
use keysmash_rs::app::{self, AppOptions};
use keysmash_rs::cli::{Cli, Command, HistoryCommand, RunArgs, SetArgs};
use keysmash_rs::control::{ControlRequest, ControlResponse};
use keysmash_rs::report::{preview, SettingsReport};
use keysmash_rs::{logging, paths, KeysmashApp};
use owo_colors::OwoColorize;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let settings = cli.settings.as_deref();

    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args, settings).await,
        Command::Start => simple(ControlRequest::StartTyping, "Typing started").await,
        Command::Stop => simple(ControlRequest::StopTyping, "Typing stopped").await,
        Command::Toggle => simple(ControlRequest::ToggleTyping, "Typing toggled").await,
        Command::Status => status().await,
        Command::Settings => show_settings(settings).await,
        Command::Set(args) => set(args, settings).await,
        Command::History(HistoryCommand::Add { text }) => history_add(text, settings).await,
        Command::History(HistoryCommand::List) => history_list(settings).await,
        Command::Watch => watch().await,
        Command::CheckUpdate => check_update().await,
    }
}

async fn run(args: RunArgs, settings_path: Option<&str>) -> Result<()> {
    info!("🚀 keysmash-rs starting up!");
    info!("{}", "=".repeat(50));

    let settings = app::load_settings(settings_path)?;
    let current = settings.get();
    info!("✅ Settings loaded");
    info!("   Hotkey: {}", current.hotkey);
    info!("   Delay: {} ms", current.delay);
    info!("   Loop: {}", current.loop_typing);
    info!("   Text: {}", preview(&current.text));

    let options = AppOptions {
        strategy: args.strategy,
        control_socket: paths::control_socket(),
        update_check: !args.no_update_check,
    };
    let app = KeysmashApp::new(settings, options);

    let local = tokio::task::LocalSet::new();
    local.run_until(app.run(shutdown_signal())).await?;

    info!("✅ Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!("Failed to set up SIGTERM handler: {err}");
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT (Ctrl+C)"),
        Err(err) => {
            warn!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn send(request: ControlRequest) -> Result<ControlResponse> {
    keysmash_rs::control::request(&paths::control_socket(), &request).await
}

#[cfg(not(unix))]
async fn send(_request: ControlRequest) -> Result<ControlResponse> {
    bail!("Control commands need a Unix control socket; use the hotkey on this platform")
}

fn expect_ok(response: ControlResponse) -> Result<ControlResponse> {
    match response {
        ControlResponse::Error { message } => bail!(message),
        other => Ok(other),
    }
}

async fn simple(request: ControlRequest, done: &str) -> Result<()> {
    expect_ok(send(request).await?)?;
    println!("{} {done}", "✓".green());
    Ok(())
}

async fn status() -> Result<()> {
    match expect_ok(send(ControlRequest::GetTypingStatus).await?)? {
        ControlResponse::TypingStatus { typing: true } => println!("{}", "typing".green()),
        ControlResponse::TypingStatus { typing: false } => println!("{}", "idle".dimmed()),
        other => bail!("Unexpected response: {other:?}"),
    }
    Ok(())
}

/// Settings commands talk to the running engine when there is one and edit
/// the settings file (`--settings` or the default) directly otherwise.
async fn show_settings(settings_path: Option<&str>) -> Result<()> {
    match send(ControlRequest::GetSettings).await {
        Ok(response) => match expect_ok(response)? {
            ControlResponse::Settings { settings } => {
                println!("{}", SettingsReport::new(&settings, "running engine"));
            }
            other => bail!("Unexpected response: {other:?}"),
        },
        Err(_) => {
            let store = app::load_settings(settings_path)?;
            let source = store.path().display().to_string();
            println!("{}", SettingsReport::new(&store.get(), &source));
        }
    }
    Ok(())
}

async fn set(args: SetArgs, settings_path: Option<&str>) -> Result<()> {
    let update = args.into_update();
    if update.is_empty() {
        bail!("Nothing to change; pass --text, --delay, --loop or --hotkey");
    }

    match send(ControlRequest::SaveSettings {
        settings: update.clone(),
    })
    .await
    {
        Ok(response) => match expect_ok(response)? {
            ControlResponse::Saved {
                settings,
                hotkey_registered,
            } => {
                println!("{} Settings saved", "✓".green());
                if !hotkey_registered {
                    println!(
                        "  {} Hotkey {} could not be registered",
                        "!".yellow(),
                        settings.hotkey
                    );
                }
            }
            other => bail!("Unexpected response: {other:?}"),
        },
        Err(_) => {
            let store = app::load_settings(settings_path)?;
            store.save(update)?;
            println!(
                "{} Settings saved to {} (engine not running)",
                "✓".green(),
                store.path().display()
            );
        }
    }
    Ok(())
}

async fn history_add(text: String, settings_path: Option<&str>) -> Result<()> {
    let history = match send(ControlRequest::SaveToHistory { text: text.clone() }).await {
        Ok(response) => match expect_ok(response)? {
            ControlResponse::History { history } => history,
            other => bail!("Unexpected response: {other:?}"),
        },
        Err(_) => app::load_settings(settings_path)?.save_to_history(&text)?,
    };
    println!("{} History has {} entries", "✓".green(), history.len());
    Ok(())
}

async fn history_list(settings_path: Option<&str>) -> Result<()> {
    let settings = match send(ControlRequest::GetSettings).await {
        Ok(response) => match expect_ok(response)? {
            ControlResponse::Settings { settings } => settings,
            other => bail!("Unexpected response: {other:?}"),
        },
        Err(_) => app::load_settings(settings_path)?.get(),
    };
    for (idx, entry) in settings.history.iter().enumerate() {
        println!("{:>2}. {}", idx + 1, preview(entry));
    }
    Ok(())
}

#[cfg(unix)]
async fn watch() -> Result<()> {
    use keysmash_rs::control::Notification;

    keysmash_rs::control::watch(&paths::control_socket(), |notification| {
        let line = match notification {
            Notification::Engine(event) => serde_json::to_value(&event),
            Notification::UpdateAvailable(info) => serde_json::to_value(&info).map(|update| {
                serde_json::json!({ "event": "update-available", "update": update })
            }),
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(err) => warn!("Failed to encode event: {err}"),
        }
    })
    .await
}

#[cfg(not(unix))]
async fn watch() -> Result<()> {
    send(ControlRequest::Watch).await.map(|_| ())
}

async fn check_update() -> Result<()> {
    let update = match send(ControlRequest::CheckForUpdates).await {
        Ok(response) => match expect_ok(response)? {
            ControlResponse::Update { update } => update,
            other => bail!("Unexpected response: {other:?}"),
        },
        Err(_) => {
            keysmash_rs::update::UpdateChecker::new()?
                .check_for_updates()
                .await
        }
    };

    match update {
        Some(info) if info.available => {
            println!(
                "{} {} -> {}",
                "Update available:".yellow(),
                info.current_version,
                info.new_version.green()
            );
            if let Some(url) = info.release_url {
                println!("  {url}");
            }
            if let Some(changelog) = info.changelog {
                println!();
                println!("{changelog}");
            }
        }
        Some(info) => println!("{} Up to date ({})", "✓".green(), info.current_version),
        None => println!(
            "{} No update information (checked recently or offline)",
            "!".yellow()
        ),
    }
    Ok(())
}
