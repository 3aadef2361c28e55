//! Headless arena car simulation.
//!
//! Runs the fixed-tick loop without a window: a scripted demo drive by
//! default, or a recorded input file with `--playback`.

use anyhow::Context;
use arenacar::game::Game;
use arenacar::input::{Inputs, KeyEvent};
use arenacar::playback::{InputRecorder, InputRecording, PlaybackDriver};
use arenacar::settings::{Settings, SettingsWatcher};
use arenacar::utilities::SerdeJsonQuick;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "arenacar")]
#[command(author, version, about = "Arcade car-soccer physics, headless", long_about = None)]
struct Cli {
    /// Number of ticks to simulate
    #[arg(short, long, default_value = "600")]
    ticks: u64,

    /// Settings file (JSON); defaults are used when absent
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Reload the settings file whenever it changes
    #[arg(short, long)]
    watch: bool,

    /// Save the inputs of this run to a file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Replay inputs from a recording instead of the demo script
    #[arg(long)]
    playback: Option<PathBuf>,

    /// Log the HUD line every this many ticks
    #[arg(long, default_value = "60")]
    hud_every: u64,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Key events for the demo drive, repeating every 300 ticks: drive forward,
/// jump and front flip, land, then jump and spin in the air while boosting.
fn demo_events(tick: u64) -> &'static [KeyEvent<'static>] {
    use KeyEvent::{Down, Up};
    match tick % 300 {
        0 => &[Up("KeyW"), Up("KeyA")],
        60 => &[Down("KeyW")],
        120 | 130 => &[Down("Space")],
        121 => &[Up("Space")],
        131 => &[Up("Space"), Up("KeyW")],
        200 => &[Down("Space")],
        201 => &[Up("Space"), Down("KeyQ"), Down("ShiftLeft")],
        241 => &[Up("KeyQ"), Up("ShiftLeft"), Down("KeyW"), Down("KeyA")],
        _ => &[],
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("arenacar v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &cli.settings {
        Some(path) if path.exists() => Settings::load_json(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        Some(path) => {
            warn!(path = %path.display(), "settings file not found, writing defaults");
            let settings = Settings::default();
            settings.save_json(path)?;
            settings
        }
        None => Settings::default(),
    };

    let watcher = match (&cli.settings, cli.watch) {
        (Some(path), true) => Some(SettingsWatcher::new(path)?),
        (None, true) => {
            warn!("--watch needs --settings, hot reload disabled");
            None
        }
        _ => None,
    };

    let mut playback = match &cli.playback {
        Some(path) => {
            let recording = InputRecording::load_json(path)
                .with_context(|| format!("loading recording from {}", path.display()))?;
            info!(ticks = recording.tick_count(), "replaying recording");
            Some(PlaybackDriver::new(recording))
        }
        None => None,
    };
    let mut recorder = cli.record.as_ref().map(|_| InputRecorder::new());

    let mut game = Game::new(settings);
    let mut keys = Inputs::default();

    for tick in 0..cli.ticks {
        if let Some(settings) = watcher.as_ref().and_then(|w| w.poll()) {
            game.apply_settings(settings);
        }

        let input = match &mut playback {
            Some(driver) => match driver.next_input() {
                Some(input) => input,
                None => {
                    info!(tick, "recording finished");
                    break;
                }
            },
            None => {
                for event in demo_events(tick) {
                    keys.apply(*event);
                }
                keys.snapshot()
            }
        };
        if let Some(recorder) = &mut recorder {
            recorder.record(input);
        }

        game.tick(&input);

        if cli.hud_every > 0 && tick % cli.hud_every == 0 {
            info!(tick, "{}", game.hud());
        }
    }

    if let (Some(path), Some(recorder)) = (&cli.record, recorder) {
        let recording = recorder.finish();
        recording
            .save_json(path)
            .with_context(|| format!("saving recording to {}", path.display()))?;
        info!(path = %path.display(), ticks = recording.tick_count(), "inputs recorded");
    }

    if let Some(pose) = game.car_pose() {
        let t = pose.translation;
        info!(x = t.x, y = t.y, z = t.z, "final car position");
    }

    Ok(())
}
