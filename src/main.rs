//! framegrab: command-line front end for the capture controller
//!
//! Probes sources, grabs frames to disk with the background loop, serves
//! frames over TCP and fetches them from a remote server.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use framegrab::{
    capture::{CaptureBackend, Frame, MockBackend},
    config::CaptureConfig,
    controller::VideoCapture,
    model::{CaptureProperty, CaptureSource, FlipType},
    remote::{FrameServer, FrameSource, LocalFrameSource, RemoteFrameSource},
    util::encode::{ImageFormat, save_frame},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Frames produced by each file source when running with `--mock`
const MOCK_FILE_FRAMES: u64 = 300;

#[derive(Parser)]
#[command(name = "framegrab")]
#[command(about = "Grab frames from cameras and video sources")]
struct Cli {
    /// Use synthetic frames instead of real sources
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a source and print its properties
    Probe {
        /// Camera index or file path
        source: CaptureSource,
    },
    /// Run the background grab loop and save frames to a directory
    Grab {
        /// Camera index or file path
        source:  CaptureSource,
        /// Output directory
        #[arg(short, long)]
        out_dir: PathBuf,
        /// Stop after this many frames (default: until the stream ends)
        #[arg(short = 'n', long)]
        count:   Option<u64>,
        /// Image format (png, jpeg, webp)
        #[arg(long, default_value = "png")]
        format:  ImageFormat,
        /// Image quality (0-100)
        #[arg(long, default_value_t = 80)]
        quality: u8,
        /// Mirror frames (none, horizontal, vertical, both)
        #[arg(long)]
        flip:    Option<FlipType>,
        /// Save half-resolution frames
        #[arg(long)]
        small:   bool,
    },
    /// Serve frames from a source over TCP
    Serve {
        /// Camera index or file path
        source: CaptureSource,
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: String,
        /// Mirror frames (none, horizontal, vertical, both)
        #[arg(long)]
        flip:   Option<FlipType>,
    },
    /// Fetch one frame from a frame server
    Fetch {
        /// Server address
        remote:  String,
        /// Output file path (format from the extension)
        #[arg(short, long)]
        out:     PathBuf,
        /// Request a half-resolution frame
        #[arg(long)]
        small:   bool,
        /// Image quality (0-100)
        #[arg(long, default_value_t = 80)]
        quality: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Respects RUST_LOG; default level: info
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framegrab=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = CaptureConfig::from_env();

    match cli.command {
        Commands::Probe { source } => probe(cli.mock, &source, config),
        Commands::Grab {
            source,
            out_dir,
            count,
            format,
            quality,
            flip,
            small,
        } => {
            let config = apply_flip(config, flip);
            let options = GrabOptions {
                out_dir,
                count,
                format,
                quality,
                small,
            };
            tokio::task::spawn_blocking(move || grab(cli.mock, &source, config, options))
                .await
                .context("Grab task panicked")?
        }
        Commands::Serve {
            source,
            listen,
            flip,
        } => serve(cli.mock, &source, apply_flip(config, flip), &listen).await,
        Commands::Fetch {
            remote,
            out,
            small,
            quality,
        } => fetch(&remote, &out, small, quality, &config).await,
    }
}

fn apply_flip(config: CaptureConfig, flip: Option<FlipType>) -> CaptureConfig {
    match flip {
        Some(flip) => config.with_flip(flip),
        None => config,
    }
}

fn create_backend(mock: bool, source: &CaptureSource) -> Result<Box<dyn CaptureBackend>> {
    if mock {
        let backend = match source {
            CaptureSource::File(path) => MockBackend::new().with_file(path.clone(), MOCK_FILE_FRAMES),
            CaptureSource::Device(_) => MockBackend::new(),
        };
        return Ok(Box::new(backend));
    }

    #[cfg(feature = "image-backend")]
    {
        Ok(Box::new(framegrab::capture::ImageSequenceBackend::new()))
    }
    #[cfg(not(feature = "image-backend"))]
    {
        anyhow::bail!("No capture backend available. Use --mock or rebuild with --features image-backend")
    }
}

fn open_capture(mock: bool, source: &CaptureSource, config: CaptureConfig) -> Result<VideoCapture> {
    let backend = create_backend(mock, source)?;
    VideoCapture::open_with_config(backend.as_ref(), source, config).map_err(|e| {
        error!("{}", e.remediation_hint());
        anyhow::Error::new(e)
    })
}

fn probe(mock: bool, source: &CaptureSource, config: CaptureConfig) -> Result<()> {
    let capture = open_capture(mock, source, config)?;

    println!("Source:  {} ({:?})", capture.source(), capture.source_kind());
    println!("Backend: {}", capture.backend_kind());
    println!("Size:    {}x{}", capture.width(), capture.height());
    println!("FPS:     {}", capture.get_property(CaptureProperty::Fps));
    let frames = capture.get_property(CaptureProperty::FrameCount);
    if frames > 0.0 {
        println!("Frames:  {}", frames);
    }
    Ok(())
}

struct GrabOptions {
    out_dir: PathBuf,
    count:   Option<u64>,
    format:  ImageFormat,
    quality: u8,
    small:   bool,
}

fn grab(mock: bool, source: &CaptureSource, config: CaptureConfig, options: GrabOptions) -> Result<()> {
    if options.quality > 100 {
        anyhow::bail!("Quality must be between 0 and 100");
    }
    fs::create_dir_all(&options.out_dir)
        .with_context(|| format!("Failed to create {}", options.out_dir.display()))?;

    let capture = Arc::new(open_capture(mock, source, config)?);
    let saved = Arc::new(AtomicU64::new(0));
    let out_dir = options.out_dir.clone();

    let weak = Arc::downgrade(&capture);
    let counter = Arc::clone(&saved);
    capture.subscribe(move |grabbed| {
        let Some(capture) = weak.upgrade() else {
            return;
        };
        if options.count.is_some_and(|limit| counter.load(Ordering::SeqCst) >= limit) {
            return;
        }

        let frame = match grabbed.retrieve(0) {
            Ok(Some(frame)) if options.small => frame.pyr_down(),
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to retrieve frame {}: {}", grabbed.sequence(), e);
                return;
            }
        };

        if let Err(e) = save(&frame, &options, grabbed.sequence()) {
            error!("Failed to save frame {}: {}", grabbed.sequence(), e);
            capture.stop();
            return;
        }

        let done = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if options.count.is_some_and(|limit| done >= limit) {
            capture.stop();
        }
    });

    capture.start(None)?;
    let outcome = capture.wait();
    let total = saved.load(Ordering::SeqCst);

    match outcome {
        Some(Ok(exit)) => {
            info!("Capture loop ended: {:?}", exit);
            println!("Saved {} frames to {}", total, out_dir.display());
            Ok(())
        }
        Some(Err(e)) => {
            error!("{}", e.remediation_hint());
            Err(e).context(format!("Capture failed after {} frames", total))
        }
        None => Ok(()),
    }
}

fn save(frame: &Frame, options: &GrabOptions, sequence: u64) -> Result<()> {
    let path = options
        .out_dir
        .join(format!("frame_{:06}.{}", sequence, options.format.extension()));
    save_frame(frame, &path, options.quality)?;
    Ok(())
}

async fn serve(mock: bool, source: &CaptureSource, config: CaptureConfig, listen: &str) -> Result<()> {
    let capture = Arc::new(open_capture(mock, source, config)?);
    let frames: Arc<dyn FrameSource> = Arc::new(LocalFrameSource::new(capture));

    let server = FrameServer::bind(listen, frames)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;
    println!("Serving frames on {}", server.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down frame server");
    shutdown_tx.send(true).ok();

    task.await.context("Frame server task panicked")??;
    Ok(())
}

async fn fetch(remote: &str, out: &Path, small: bool, quality: u8, config: &CaptureConfig) -> Result<()> {
    let source = RemoteFrameSource::connect(remote, config).await?;
    let frame = if small {
        source.query_small_frame().await?
    } else {
        source.query_frame().await?
    };

    let Some(frame) = frame else {
        anyhow::bail!("{} has no frame to give", source.describe());
    };
    let format = save_frame(&frame, out, quality)?;
    println!(
        "Saved {}x{} {} frame to {}",
        frame.width(),
        frame.height(),
        format,
        out.display()
    );
    Ok(())
}
