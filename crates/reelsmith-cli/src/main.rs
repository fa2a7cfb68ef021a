mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reelsmith_capture::{CaptureSession, CaptureSessionConfig, FrameSequence, PlaywrightBackend};
use reelsmith_compose::{CompositionSpec, FfmpegCompositor};
use reelsmith_core::{ReelConfig, SubtitleSource};
use reelsmith_tasks::{
    open_store, MemoryTaskStore, ReelPipeline, RenderOptions, RenderRequest, TaskManager,
    TaskStatus,
};

const DEFAULT_CONFIG_FILE: &str = "reelsmith.toml";

#[derive(Parser)]
#[command(
    name = "reelsmith",
    version,
    about = "Reelsmith: animated overlays rendered into short vertical videos"
)]
struct Cli {
    /// Config file (default: ./reelsmith.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the render service (generate / status / download API)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Render one reel for a topic and wait for the result
    Render {
        /// Topic of the reel
        #[arg()]
        topic: String,

        /// Duration in seconds (default: length of the narration audio)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Overlay capture frame rate
        #[arg(long)]
        fps: Option<f64>,

        /// Base video to composite onto
        #[arg(long)]
        base_video: Option<PathBuf>,

        /// Narration audio to use instead of the configured one
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Copy the finished video here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Capture an overlay page to a transparent PNG sequence
    Capture {
        /// URL of the overlay document
        #[arg()]
        url: String,

        #[arg(short, long, default_value = "frames")]
        out_dir: PathBuf,

        #[arg(short, long)]
        duration: f64,

        #[arg(long)]
        fps: Option<f64>,
    },
    /// Composite a base video, a frame sequence and audio into one file
    Compose {
        #[arg(long)]
        base_video: PathBuf,

        /// Directory holding frame_00000.png, frame_00001.png, ...
        #[arg(long)]
        frames: PathBuf,

        #[arg(long)]
        fps: Option<f64>,

        #[arg(long)]
        audio: PathBuf,

        /// SRT file to burn in
        #[arg(long)]
        subtitles: Option<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write a config file with every default spelled out
    Init {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Serve { host, port } => {
            let config = load_config(config_path)?;
            run_async(cmd_serve(config, host, port))
        }
        Commands::Render {
            topic,
            duration,
            fps,
            base_video,
            audio,
            output,
        } => {
            let config = load_config(config_path)?;
            let options = RenderOptions {
                duration_secs: duration,
                fps,
                base_video,
                audio,
            };
            run_async(cmd_render(config, topic, options, output))
        }
        Commands::Capture {
            url,
            out_dir,
            duration,
            fps,
        } => {
            let config = load_config(config_path)?;
            run_async(cmd_capture(config, url, out_dir, duration, fps))
        }
        Commands::Compose {
            base_video,
            frames,
            fps,
            audio,
            subtitles,
            output,
        } => {
            let config = load_config(config_path)?;
            run_async(cmd_compose(
                config, base_video, frames, fps, audio, subtitles, output,
            ))
        }
    }
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

fn load_config(path: Option<&Path>) -> Result<ReelConfig> {
    match path {
        Some(path) => ReelConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            ReelConfig::load_from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("failed to load config: {DEFAULT_CONFIG_FILE}"))
        }
        None => Ok(ReelConfig::default()),
    }
}

fn cmd_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    ReelConfig::default()
        .save_to_file(path)
        .with_context(|| format!("failed to write config: {}", path.display()))?;
    println!("✓ Wrote {}", path.display());
    Ok(())
}

/// Bind the HTTP surface. The overlay document and bridge content are served
/// from here, so renders need it running.
async fn start_server(
    config: &ReelConfig,
    manager: TaskManager,
    pipeline: &ReelPipeline,
    host: &str,
    port: u16,
) -> Result<(SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)> {
    let state = Arc::new(server::AppState {
        manager,
        bridge: pipeline.bridge_store(),
    });
    let app = server::router(state, &config.tasks.output_dir);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });
    Ok((addr, handle))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}

async fn cmd_serve(config: ReelConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let pipeline = ReelPipeline::local(config.clone());
    let store = open_store(&config.tasks).context("failed to open task store")?;
    let pipeline = Arc::new(pipeline);
    let manager = TaskManager::new(
        store,
        pipeline.clone(),
        config.tasks.max_concurrent_renders,
    );
    let compositor = FfmpegCompositor::from_config(&config);
    if !compositor.is_available().await {
        tracing::warn!(
            ffmpeg = %config.compose.ffmpeg_bin,
            "ffmpeg is not available; renders will fail at composition"
        );
    }
    let recovered = manager.recover().context("failed to recover tasks")?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "failed tasks interrupted by the last shutdown");
    }

    let (addr, handle) = start_server(&config, manager, &pipeline, &host, port).await?;
    println!("📡 Reelsmith listening on http://{addr}");
    println!("   Overlay:  {}", config.capture.overlay_url);
    println!("   Renders:  {}", config.tasks.output_dir.display());

    handle.await.context("server task failed")??;
    Ok(())
}

async fn cmd_render(
    config: ReelConfig,
    topic: String,
    options: RenderOptions,
    output: Option<PathBuf>,
) -> Result<()> {
    let start = Instant::now();
    let pipeline = Arc::new(ReelPipeline::local(config.clone()));
    let manager = TaskManager::new(
        Arc::new(MemoryTaskStore::new()),
        pipeline.clone(),
        config.tasks.max_concurrent_renders,
    );

    let (addr, server) = start_server(
        &config,
        manager.clone(),
        &pipeline,
        &config.server.host,
        config.server.port,
    )
    .await?;
    tracing::debug!(%addr, "overlay server started");

    println!("🎬 Rendering \"{topic}\"");
    let task_id = manager.submit(RenderRequest::new(topic).with_options(options))?;
    let task = manager.wait(&task_id, Duration::from_millis(250)).await?;
    server.abort();

    if task.status != TaskStatus::Completed {
        anyhow::bail!(
            "render failed: {}",
            task.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let locator = manager.result_locator(&task_id)?;
    println!("   ✓ Done in {:.1}s", start.elapsed().as_secs_f64());
    match output {
        Some(output) => {
            std::fs::copy(&locator, &output)
                .with_context(|| format!("failed to copy {locator} to {}", output.display()))?;
            println!("   Output: {}", output.display());
        }
        None => println!("   Output: {locator}"),
    }
    Ok(())
}

async fn cmd_capture(
    config: ReelConfig,
    url: String,
    out_dir: PathBuf,
    duration: f64,
    fps: Option<f64>,
) -> Result<()> {
    let mut session_config =
        CaptureSessionConfig::from_config(url, &config.render, &config.capture);
    if let Some(fps) = fps {
        session_config.fps = fps;
    }

    let mut backend = PlaywrightBackend::new().with_node_bin(config.capture.node_bin.clone());
    if let Some(script) = &config.capture.driver_script {
        backend = backend.with_script(script.clone());
    }

    let start = Instant::now();
    let mut session = CaptureSession::new(session_config, Box::new(backend));
    let seq = session
        .capture_sequence(
            &out_dir,
            reelsmith_core::Duration::from_seconds(duration),
            |done, total| {
                if done % 30 == 0 || done == total {
                    tracing::info!(frame = done, total, "captured");
                }
            },
        )
        .await?;

    println!(
        "✓ Captured {} frames in {:.1}s → {}",
        seq.len(),
        start.elapsed().as_secs_f64(),
        seq.dir().display()
    );
    Ok(())
}

async fn cmd_compose(
    config: ReelConfig,
    base_video: PathBuf,
    frames: PathBuf,
    fps: Option<f64>,
    audio: PathBuf,
    subtitles: Option<PathBuf>,
    output: PathBuf,
) -> Result<()> {
    let fps = fps.unwrap_or(config.render.fps);
    let frames = FrameSequence::scan(&frames, fps)
        .with_context(|| format!("failed to read frames in {}", frames.display()))?;

    let spec = CompositionSpec {
        base_video,
        frames,
        audio,
        subtitles: subtitles.map(SubtitleSource::File),
        output,
    };
    let start = Instant::now();
    let output = FfmpegCompositor::from_config(&config).compose(&spec).await?;
    println!(
        "✓ Composed {} in {:.1}s",
        output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
