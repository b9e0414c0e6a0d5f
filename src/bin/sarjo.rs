//! CLI binary for Sarjo AI Studio.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use sarjo::composer::ComposedPrompt;
use sarjo::config::LiveLanguage;
use sarjo::gemini::{GeminiClient, GenerativeBackend, WebSocketConnector};
use sarjo::live::{LiveServices, LiveSession, LiveSettings, LiveVariant, SystemDevices};
use sarjo::panel::profiles::{ModeProfile, PanelMode};
use sarjo::panel::video::{PRODUCTION_FAILED, VideoDirector};
use sarjo::panel::{ChatPanel, PanelEvent, PanelOutcome};
use sarjo::shell::auth::{AuthChoice, AuthTimings};
use sarjo::shell::{Shell, ShellCommand, ShellReply, StudioMode};
use sarjo::transcript::Role;
use sarjo::{AlarmRegistry, NeuralVault, StudioConfig};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Width of each level meter in the live status line.
const METER_WIDTH: usize = 12;

type InputLines = Lines<BufReader<Stdin>>;

/// Sarjo AI Studio: multi-mode generative AI in the terminal.
#[derive(Parser)]
#[command(name = "sarjo", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Open the interactive studio (default).
    Studio {
        /// How to get past the sign-in screen.
        #[arg(long, value_enum, default_value_t = SignIn::Ask)]
        sign_in: SignIn,
    },

    /// Run a live voice session directly.
    Live {
        /// Stream camera frames too.
        #[arg(long)]
        one_to_one: bool,

        /// Spoken language: en, mr or hi.
        #[arg(long)]
        lang: Option<LiveLanguage>,

        /// Tell a story with generated pictures.
        #[arg(long)]
        story: bool,
    },

    /// Produce a video from a prompt.
    Video {
        /// Scene description.
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// List available audio devices.
    Devices,

    /// Inspect or clear the neural vault.
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Print archived observations.
    Show,
    /// Delete every observation.
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SignIn {
    Ask,
    Google,
    Email,
    Skip,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Studio {
        sign_in: SignIn::Ask,
    });

    if let Command::Config {
        action: ConfigAction::Init { force },
    } = command
    {
        return init_config(cli.config.as_deref(), force);
    }

    let config = StudioConfig::load_or_default(cli.config.as_deref())?;
    let _log_guard = sarjo::logging::init(&config.logging)?;

    match command {
        Command::Studio { sign_in } => run_studio(config, sign_in).await,
        Command::Live {
            one_to_one,
            lang,
            story,
        } => run_live_command(config, one_to_one, lang, story).await,
        Command::Video { prompt } => run_video(config, &prompt.join(" ")).await,
        Command::Devices => list_devices(),
        Command::Vault { action } => vault_command(&config, action),
        Command::Config { .. } => Ok(()),
    }
}

// ── Studio ──

async fn run_studio(config: StudioConfig, sign_in: SignIn) -> anyhow::Result<()> {
    let client = GeminiClient::new(&config.api)?;
    let backend: Arc<dyn GenerativeBackend> = Arc::new(client.clone());
    let alarms = AlarmRegistry::new();
    let mut shell = Shell::new(alarms.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let choice = match sign_in {
        SignIn::Ask => ask_sign_in(&mut lines).await?,
        SignIn::Google => AuthChoice::Google,
        SignIn::Email => AuthChoice::Email,
        SignIn::Skip => AuthChoice::Skip,
    };
    sarjo::shell::auth::sign_in(choice, AuthTimings::default()).await;

    let mut panels: HashMap<PanelMode, Arc<ChatPanel>> = HashMap::new();
    render_screen(&shell);

    loop {
        print!("{}> ", shell.mode().label());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        if let Some(parsed) = ShellCommand::parse(&line) {
            match parsed.map(|command| shell.execute(command)) {
                Err(e) => println!("{e}"),
                Ok(ShellReply::Message(text)) => println!("{text}"),
                Ok(ShellReply::Switched(mode)) => {
                    render_screen(&shell);
                    if let Some(variant) = mode.live_variant() {
                        let services = live_services(&config, &client, &alarms);
                        run_live(&config, variant, services, &mut lines).await;
                    }
                }
                Ok(ShellReply::Quit) => break,
            }
            continue;
        }

        let mode = shell.mode();
        if let Some(panel_mode) = mode.panel_mode() {
            let panel = panels
                .entry(panel_mode)
                .or_insert_with(|| {
                    Arc::new(ChatPanel::new(
                        ModeProfile::for_mode(panel_mode, &config.models),
                        config.persona.identity.clone(),
                        Arc::clone(&backend),
                        alarms.clone(),
                    ))
                })
                .clone();
            let Some(prompt) = shell.compose(&line, panel.is_busy()) else {
                continue;
            };
            if send_to_panel(&panel, prompt).await == PanelOutcome::SwitchToVoice {
                shell.switch(StudioMode::Live);
                render_screen(&shell);
                let services = live_services(&config, &client, &alarms);
                run_live(&config, LiveVariant::Assistant, services, &mut lines).await;
            }
        } else if let Some(variant) = mode.live_variant() {
            let services = live_services(&config, &client, &alarms);
            run_live(&config, variant, services, &mut lines).await;
        } else {
            println!("Pick a mode with /mode (see /modes).");
        }
    }

    info!("studio closed");
    Ok(())
}

async fn ask_sign_in(lines: &mut InputLines) -> anyhow::Result<AuthChoice> {
    println!("Neural Link :: Uplink to Sarjo AI Studio Core");
    println!("  [g] Sign up with Google");
    println!("  [e] Continue with Email");
    println!("  [s] Skip Authorization");
    print!("> ");
    std::io::stdout().flush()?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(match answer.trim().to_ascii_lowercase().as_str() {
        "e" | "email" => AuthChoice::Email,
        "s" | "skip" => AuthChoice::Skip,
        _ => AuthChoice::Google,
    })
}

fn render_screen(shell: &Shell) {
    println!();
    println!("{}", shell.header(chrono::Utc::now()));
    println!();
    for line in shell.sidebar() {
        println!("{line}");
    }
    println!();
    let mode = shell.mode();
    if let Some(text) = mode.landing_text() {
        println!("{text}");
        println!();
    } else if mode.is_live() {
        println!("Press Enter to open the link again after it ends.");
    }
}

async fn send_to_panel(panel: &ChatPanel, prompt: ComposedPrompt) -> PanelOutcome {
    let mut events = panel.subscribe();
    let send = panel.send(prompt);
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            Ok(event) = events.recv() => render_event(panel, &event),
        }
    };
    while let Ok(event) = events.try_recv() {
        render_event(panel, &event);
    }
    println!();
    outcome
}

fn render_event(panel: &ChatPanel, event: &PanelEvent) {
    match event {
        PanelEvent::Appended(message) if message.role == Role::Model => {
            print!("\nsarjo> {}", message.content);
        }
        PanelEvent::Delta { fragment, .. } => print!("{fragment}"),
        PanelEvent::AssetAttached { id, kind } => {
            let asset = panel.transcript().get(id).and_then(|m| m.asset.clone());
            match asset.as_deref().map(save_asset) {
                Some(Ok(path)) => print!("\n[{kind:?} saved to {}]", path.display()),
                Some(Err(e)) => print!("\n[{kind:?} could not be saved: {e}]"),
                None => {}
            }
        }
        PanelEvent::Appended(_) | PanelEvent::Settled(_) => {}
    }
    let _ = std::io::stdout().flush();
}

/// Write a `data:` URL asset under the cache directory.
fn save_asset(data_url: &str) -> anyhow::Result<PathBuf> {
    let (header, payload) = data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(|| anyhow::anyhow!("not an inline asset"))?;
    let extension = header.rsplit('/').next().unwrap_or("bin");
    let bytes = BASE64.decode(payload)?;
    let dir = sarjo::studio_dirs::cache_dir().join("assets");
    std::fs::create_dir_all(&dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%3f");
    let path = dir.join(format!("sarjo-{stamp}.{extension}"));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

// ── Live ──

fn live_services(
    config: &StudioConfig,
    client: &GeminiClient,
    alarms: &AlarmRegistry,
) -> LiveServices {
    LiveServices {
        connector: Arc::new(WebSocketConnector::new(
            config.api.live_url.clone(),
            client.api_key(),
        )),
        devices: Arc::new(SystemDevices::new(config.audio.clone(), config.live.clone())),
        backend: Arc::new(client.clone()),
        alarms: alarms.clone(),
        vault: NeuralVault::from_config(&config.vault),
    }
}

async fn run_live(
    config: &StudioConfig,
    variant: LiveVariant,
    services: LiveServices,
    lines: &mut InputLines,
) {
    let mut session = LiveSession::new(variant, LiveSettings::from_config(config), services);
    drive_live(&mut session, lines).await;
}

/// Run `session` until it ends, Enter is pressed or Ctrl+C arrives.
async fn drive_live(session: &mut LiveSession, lines: &mut InputLines) {
    println!(
        "Live {} :: press Enter or Ctrl+C to end the session",
        session.variant().name()
    );

    let mut snapshots = session.subscribe();
    let renderer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let line = snapshots.borrow_and_update().render_line(METER_WIDTH);
            eprint!("\r\x1b[2K{line}");
        }
    });

    let stop = CancellationToken::new();
    let result = {
        let run = session.run(stop.clone());
        tokio::pin!(run);
        loop {
            tokio::select! {
                result = &mut run => break result,
                _ = lines.next_line(), if !stop.is_cancelled() => stop.cancel(),
                _ = tokio::signal::ctrl_c(), if !stop.is_cancelled() => {
                    info!("received Ctrl+C, ending live session");
                    stop.cancel();
                }
            }
        }
    };
    renderer.abort();
    eprintln!();

    if let Err(e) = result {
        warn!(variant = session.variant().name(), "live session failed: {e}");
    }
    match session.last_error() {
        Some(label) => println!("{label}"),
        None => println!("{}", session.status()),
    }
}

async fn run_live_command(
    config: StudioConfig,
    one_to_one: bool,
    lang: Option<LiveLanguage>,
    story: bool,
) -> anyhow::Result<()> {
    let client = GeminiClient::new(&config.api)?;
    let alarms = AlarmRegistry::new();
    let variant = if one_to_one {
        LiveVariant::OneToOne
    } else {
        LiveVariant::Assistant
    };
    let services = live_services(&config, &client, &alarms);
    let mut session = LiveSession::new(variant, LiveSettings::from_config(&config), services);
    if let Some(lang) = lang {
        session.set_language(lang);
    }
    if story {
        session.set_story_mode(true);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    drive_live(&mut session, &mut lines).await;

    for alarm in alarms.list() {
        println!("alarm: {}  {}", alarm.time, alarm.label);
    }
    Ok(())
}

// ── Other commands ──

async fn run_video(config: StudioConfig, prompt: &str) -> anyhow::Result<()> {
    let client = GeminiClient::new(&config.api)?;
    let director = VideoDirector::new(client, config.models.video.clone(), config.video.clone());

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("  {spinner} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = director
        .produce(prompt, |status| spinner.set_message(status.message()))
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(path) => println!("Video saved to {}", path.display()),
        Err(e) => {
            warn!("video production failed: {e}");
            println!("{PRODUCTION_FAILED}");
        }
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in sarjo::live::audio::list_input_devices()? {
        println!("  {name}");
    }
    println!("\nOutput devices:");
    for name in sarjo::live::audio::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

fn vault_command(config: &StudioConfig, action: VaultAction) -> anyhow::Result<()> {
    let vault = NeuralVault::from_config(&config.vault);
    match action {
        VaultAction::Show => {
            let entries = vault.load()?;
            if entries.is_empty() {
                println!("Vault is empty ({}).", vault.path().display());
            }
            for entry in entries {
                let when = i64::try_from(entry.timestamp)
                    .ok()
                    .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
                    .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| entry.timestamp.to_string());
                println!("{when}  {}", entry.data);
            }
        }
        VaultAction::Clear => {
            vault.clear()?;
            println!("Vault cleared.");
        }
    }
    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path.map_or_else(StudioConfig::default_config_path, Path::to_path_buf);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    StudioConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
