use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use vertical_shorts::api::FootageSearch;
use vertical_shorts::api::pexels::PexelsClient;
use vertical_shorts::assembler::{Assembler, AssemblyJob};
use vertical_shorts::cancel::CancelFlag;
use vertical_shorts::caption::load_captions;
use vertical_shorts::config::Config;
use vertical_shorts::engine::MediaEngine;
use vertical_shorts::ffmpeg::FfmpegEngine;
use vertical_shorts::fitter::FitMode;
use vertical_shorts::init;
use vertical_shorts::source::LocalLibrarySource;

#[derive(Parser, Debug)]
#[command(
    name = "vertical-shorts",
    version,
    about = "Assemble a narrated vertical short from captions and stock footage"
)]
struct Cli {
    /// Narration audio file
    #[arg(long)]
    audio: PathBuf,

    /// Captions: JSON list of {start, end, text} or an .srt file
    #[arg(long)]
    subtitles_file: PathBuf,

    /// Output file stem under the videos directory (default: timestamp)
    #[arg(long)]
    output_id: Option<String>,

    /// Narration script used for search keywords
    #[arg(long, conflicts_with = "script_file")]
    script: Option<String>,

    #[arg(long)]
    script_file: Option<PathBuf>,

    /// Search remote stock footage
    #[arg(long, conflicts_with = "local_only")]
    use_pexels: bool,

    /// Never touch the network
    #[arg(long)]
    local_only: bool,

    /// Explicit clip list used instead of the assets directory
    #[arg(long, num_args = 1..)]
    videos: Vec<PathBuf>,

    /// Comma-separated clip name hints
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// from_start | centered (default: centered with --videos)
    #[arg(long)]
    fit_mode: Option<FitMode>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Fail instead of synthesizing filler footage
    #[arg(long)]
    no_placeholder: bool,
}

async fn read_script(cli: &Cli) -> Result<Option<String>> {
    if let Some(text) = &cli.script {
        return Ok(Some(text.clone()));
    }
    match &cli.script_file {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read script: {}", path.display()))?;
            Ok(Some(text))
        }
        None => Ok(None),
    }
}

fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling after the current step");
            cancel.cancel();
        }
    });
}

async fn run(cli: Cli) -> Result<i32> {
    let mut cfg = Config::load_or_default(&cli.config).await?;
    if cli.use_pexels {
        cfg.use_remote = true;
    }
    if cli.local_only {
        cfg.use_remote = false;
    }
    if cli.no_placeholder {
        cfg.use_placeholder = false;
    }
    match cli.fit_mode {
        Some(mode) => cfg.fit_mode = mode,
        None if !cli.videos.is_empty() => cfg.fit_mode = FitMode::Centered,
        None => {}
    }
    if cli.seed.is_some() {
        cfg.seed = cli.seed;
    }

    init::ensure_directories(&cfg).await?;
    if !init::check_ffmpeg().await {
        warn!("ffmpeg/ffprobe not found on PATH; probing and rendering will fail");
    }

    let captions = load_captions(&cli.subtitles_file).await?;
    let script = read_script(&cli).await?;
    let output_id = cli
        .output_id
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string());

    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    let engine: Arc<dyn MediaEngine> = Arc::new(FfmpegEngine::new(&cfg.work_dir));
    let search: Arc<dyn FootageSearch> = Arc::new(PexelsClient::new(
        cfg.pexels_api_key.clone(),
        cfg.download_timeout(),
    )?);
    let mut assembler = Assembler::from_config(&cfg, engine.clone(), search, cancel);
    if !cli.videos.is_empty() {
        info!("Using {} explicitly supplied clip(s)", cli.videos.len());
        assembler = assembler.with_local(Arc::new(LocalLibrarySource::from_files(
            cli.videos.clone(),
            engine,
        )));
    }

    let job = AssemblyJob {
        narration: cli.audio.clone(),
        captions,
        script,
        hints: (!cli.tags.is_empty()).then(|| cli.tags.clone()),
        output: cfg.output_path(&output_id),
    };

    match assembler.run(&job).await {
        Ok(report) => {
            info!(
                "Done: {} ({:.2}s, {} window(s): {} remote, {} local, {} reused, {} placeholder; {} overlay(s), {} skipped, {} caption(s) dropped)",
                report.output.display(),
                report.duration,
                report.windows,
                report.remote_clips,
                report.local_clips,
                report.reused_clips,
                report.placeholder_clips,
                report.overlays,
                report.overlays_skipped,
                report.dropped_captions
            );
            Ok(0)
        }
        Err(err) => {
            error!("{}", err);
            Ok(err.exit_code())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            1
        }
    };
    std::process::exit(code);
}
