use std::{f32::consts::TAU, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use music_player_core::{
    equalizer::{self, frequency_label, gain_label, BAND_COUNT},
    AppConfig, AudioGraphHandle, AudioGraphManager, EqualizerController, FrameOutcome,
    JsonFileStore, ManualScheduler, MediaElement, RecordingSurface, SimulatedMedia,
    SoftwareBackend, VisualizationEngine, VisualizerMode,
};
use tracing_subscriber::EnvFilter;

fn main() -> music_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let settings = cli
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.equalizer.settings_path));

    match cli.command {
        Commands::Render(args) => run_render(&config, settings, args),
        Commands::Presets => {
            list_presets();
            Ok(())
        }
        Commands::Eq { action } => run_eq(&config, settings, action),
    }
}

fn run_render(config: &AppConfig, settings: PathBuf, args: RenderArgs) -> music_player_core::Result<()> {
    let mode = args.mode.unwrap_or(config.visualizer.mode);
    tracing::info!(%mode, frames = args.frames, tone = args.tone, "rendering headless visualization");

    let sample_rate = config.audio.sample_rate as f32;
    let backend = SoftwareBackend::new(sample_rate);
    let graph = AudioGraphHandle::new(AudioGraphManager::new(
        Box::new(backend.clone()),
        config.audio.analyser_spec(),
    ));

    let media = SimulatedMedia::new("main-player");
    media.set_source(&format!("tone://{}", args.tone));
    if !args.paused {
        media.play()?;
    }

    let mut eq = EqualizerController::new(graph.clone(), JsonFileStore::open(&settings)?);
    eq.attach(&media.id())?;
    if let Some(preset) = &args.preset {
        eq.apply_preset(preset)?;
    }

    let visual = &config.visualizer;
    let mut engine = VisualizationEngine::new(
        graph.clone(),
        Arc::new(media.clone()),
        ManualScheduler::new(),
        mode,
    );
    if let Some(seed) = visual.seed {
        engine = engine.with_seed(seed);
    }
    engine.set_theme(&config.theme);
    engine.setup(
        Some(RecordingSurface::new(visual.width, visual.height, visual.device_pixel_ratio)),
        None,
    )?;

    let block_len = (sample_rate / 60.0).round().max(1.0) as usize;
    let step = TAU * args.tone / sample_rate;
    let mut phase = 0.0f32;
    let mut block = vec![0.0f32; block_len];
    let element = media.id();

    for _ in 0..args.frames {
        for sample in &mut block {
            *sample = phase.sin() * 0.5;
            phase = (phase + step) % TAU;
        }
        backend.render(&element, &block)?;

        if engine.scheduler_mut().take_due().is_none() {
            break;
        }
        if let FrameOutcome::Stopped = engine.tick() {
            break;
        }
    }

    let stats = engine.stats();
    tracing::info!(
        rendered = stats.rendered,
        active = stats.active,
        idle = stats.idle,
        failed = stats.failed,
        "render finished"
    );

    if let Some(output) = &args.output {
        let commands = engine.surface().map(|surface| surface.commands()).unwrap_or_default();
        std::fs::write(output, serde_json::to_string_pretty(commands)?)?;
        tracing::info!(?output, commands = commands.len(), "wrote last frame");
    }

    engine.teardown();
    graph.lock()?.destroy();
    Ok(())
}

fn list_presets() {
    for (name, gains) in equalizer::PRESETS {
        let gains: Vec<String> = gains.iter().map(|gain| format!("{gain:+.0}")).collect();
        println!("{name:<13} {}", gains.join(" "));
    }
}

fn run_eq(config: &AppConfig, settings: PathBuf, action: EqAction) -> music_player_core::Result<()> {
    // Changes are only persisted; no element is attached.
    let graph = AudioGraphHandle::new(AudioGraphManager::new(
        Box::new(SoftwareBackend::new(config.audio.sample_rate as f32)),
        config.audio.analyser_spec(),
    ));
    let mut eq = EqualizerController::new(graph, JsonFileStore::open(&settings)?);

    match action {
        EqAction::Show => {}
        EqAction::Set { band, gain } => eq.set_gain(band, gain)?,
        EqAction::Preset { name } => eq.apply_preset(&name)?,
        EqAction::Toggle => {
            let enabled = eq.toggle_enabled()?;
            tracing::info!(enabled, "toggled equalizer");
        }
        EqAction::Reset => eq.reset()?,
    }

    let state = eq.state();
    println!(
        "preset: {}  enabled: {}  ({})",
        state.selected_preset,
        state.enabled,
        settings.display()
    );
    for band in 0..BAND_COUNT {
        println!(
            "{band:>2}  {:>8}  {:>7}",
            frequency_label(equalizer::BAND_FREQUENCIES[band]),
            gain_label(state.gains[band])
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Music player audio graph, equalizer and visualizer", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Equalizer settings file. Overrides the configured path.
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a synthesized tone through the graph and render the visualizer
    /// headless.
    Render(RenderArgs),
    /// List the built-in equalizer presets.
    Presets,
    /// Inspect or change the persisted equalizer.
    Eq {
        #[command(subcommand)]
        action: EqAction,
    },
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// bars, wave, waveCentered or circle.
    #[arg(short, long)]
    mode: Option<VisualizerMode>,
    /// Number of display frames to run.
    #[arg(short, long, default_value_t = 120)]
    frames: u32,
    /// Tone frequency in Hz.
    #[arg(short, long, default_value_t = 440.0)]
    tone: f32,
    /// Equalizer preset to apply before rendering.
    #[arg(short, long)]
    preset: Option<String>,
    /// Write the last frame's draw commands as JSON.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Keep the media element paused, showing the idle animation.
    #[arg(long)]
    paused: bool,
}

#[derive(Subcommand, Debug)]
enum EqAction {
    Show,
    /// Set one band's gain in dB.
    Set {
        band: usize,
        #[arg(allow_hyphen_values = true)]
        gain: f32,
    },
    Preset {
        name: String,
    },
    Toggle,
    Reset,
}
