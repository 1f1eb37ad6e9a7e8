use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_desktop_cache::FreeingStrategy;
use pdf_desktop_core::{DesktopConfig, TextureManager};
use pdf_desktop_render::{DocumentHandle, LopdfRasterizer, OpenSource, PageRef, Rasterizer};
use pdf_desktop_scheduler::{SeedEntry, ViewSnapshot};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pdf-desktop-cli")]
#[command(about = "Headless driver for the PDF desktop texture pipeline")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Warm the texture cache for one or more PDFs and print a JSON report.
    Warm {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        /// View scale to load at; repeat to warm several zoom levels.
        #[arg(long = "scale", value_name = "S")]
        scales: Vec<f32>,
        /// Only load the first N pages of each document.
        #[arg(long, value_name = "N")]
        pages: Option<u32>,
        /// Texture variants kept per page.
        #[arg(long, value_name = "N")]
        max_keep: Option<usize>,
        /// Free textures by reference count instead of retaining them.
        #[arg(long)]
        strict: bool,
        /// TOML configuration file with [cache] and [scheduler] tables.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Give up waiting for the worker after this many milliseconds.
        #[arg(long, value_name = "MS", default_value_t = 30_000)]
        timeout_ms: u64,
    },
    /// Print page count and page sizes as JSON.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    page_sizes_pt: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct WarmReport {
    idle: bool,
    max_textures_keep: usize,
    freeing: FreeingStrategy,
    scales: Vec<f32>,
    documents: Vec<DocumentReport>,
    stats: StatsReport,
}

#[derive(Debug, Serialize)]
struct DocumentReport {
    path: String,
    page_count: u32,
    pages: Vec<PageReport>,
}

#[derive(Debug, Serialize)]
struct PageReport {
    page: u32,
    cached_scales: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    batches: u64,
    rasterized: u64,
    already_cached: u64,
    abandoned: u64,
    failures: u64,
    evictions: u64,
    texture_count: usize,
}

struct OpenedDocument {
    path: PathBuf,
    handle: DocumentHandle,
    page_count: u32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing();

    match cli.command {
        Commands::Warm { files, scales, pages, max_keep, strict, config, timeout_ms } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(max_keep) = max_keep {
                config.cache.max_textures_keep = max_keep;
            }
            if strict {
                config.cache.freeing = FreeingStrategy::RefCounted;
            }
            let options = WarmOptions { scales, pages, timeout: Duration::from_millis(timeout_ms) };
            run_warm(&files, config, &options)
        }
        Commands::Info { file } => run_info(&file),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Log to stderr so stdout stays machine-readable. Filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<DesktopConfig> {
    let config = match path {
        Some(path) => DesktopConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DesktopConfig::default(),
    };
    config.with_env_overrides().context("invalid environment configuration")
}

struct WarmOptions {
    scales: Vec<f32>,
    pages: Option<u32>,
    timeout: Duration,
}

fn run_warm(files: &[PathBuf], config: DesktopConfig, options: &WarmOptions) -> Result<()> {
    let mut scales = options.scales.clone();
    if scales.is_empty() {
        scales.push(1.0);
    }
    if let Some(bad) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        anyhow::bail!("--scale must be a positive number, got {bad}");
    }

    let mut rasterizer = LopdfRasterizer::new();
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        ensure_pdf_exists(file)?;
        let handle = rasterizer
            .open(OpenSource::from(file.as_path()))
            .with_context(|| format!("failed to open PDF {}", file.display()))?;
        let page_count = rasterizer.page_count(handle)?;
        documents.push(OpenedDocument { path: file.clone(), handle, page_count });
    }

    let pages: Vec<PageRef> = documents
        .iter()
        .flat_map(|doc| {
            let count = options.pages.map_or(doc.page_count, |n| n.min(doc.page_count));
            (0..count).map(move |index| PageRef::new(doc.handle, index))
        })
        .collect();

    let mut manager = TextureManager::new(Arc::new(rasterizer), config.clone())
        .context("invalid texture configuration")?;
    manager.start().context("failed to start texture worker")?;

    let seed: Vec<SeedEntry> = pages.iter().map(|&page| SeedEntry::new(page, true)).collect();
    let queued = manager.seed(&seed, scales[0]);
    tracing::info!(pages = pages.len(), queued, "seeded texture requests");

    let mut idle = manager.run_until_idle(options.timeout, |_| {});
    for &scale in &scales[1..] {
        if !idle {
            break;
        }
        manager.viewport_scheduler().schedule_now(&ViewSnapshot::new(scale, pages.clone()));
        idle = manager.run_until_idle(options.timeout, |_| {});
    }

    let stats = manager.stats();
    let report = WarmReport {
        idle,
        max_textures_keep: config.cache.max_textures_keep,
        freeing: config.cache.freeing,
        scales,
        documents: documents
            .iter()
            .map(|doc| DocumentReport {
                path: doc.path.display().to_string(),
                page_count: doc.page_count,
                pages: pages
                    .iter()
                    .filter(|page| page.document == doc.handle)
                    .map(|&page| PageReport {
                        page: page.index,
                        cached_scales: manager
                            .cache()
                            .page_scales(page)
                            .into_iter()
                            .map(|scale| scale.get())
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
        stats: StatsReport {
            batches: stats.worker.batches,
            rasterized: stats.worker.rasterized,
            already_cached: stats.worker.already_cached,
            abandoned: stats.worker.abandoned,
            failures: stats.worker.failures,
            evictions: stats.cache.evictions,
            texture_count: stats.cache.texture_count,
        },
    };
    manager.shutdown();

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !idle {
        anyhow::bail!("texture worker did not finish within {} ms", options.timeout.as_millis());
    }
    Ok(())
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut rasterizer = LopdfRasterizer::new();
    let handle = rasterizer.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = rasterizer.page_count(handle)?;
    let page_sizes_pt = (0..page_count)
        .map(|index| {
            rasterizer
                .page_size(handle, index)
                .map(|size| PageSizeOutput { width: size.width_pt, height: size.height_pt })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, page_sizes_pt };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    rasterizer.close(handle)?;

    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
