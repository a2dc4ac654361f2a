//! CLI binary for web2ink.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, converts one content record and reports the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use web2ink::config::DEFAULT_RENDERER_PATH;
use web2ink::delivery::safe_title;
use web2ink::{
    convert_json, deliver, render_script, ContentDocument, ConversionProgressCallback,
    FontConfig, InkError, PaginationMode, PipelineConfig, ProgressCallback, RmapiUploader,
};

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per method tried.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Laying out…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, stages: usize) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!("{stages} stage(s) available"));
    }

    fn on_attempt_start(&self, method: &str, retry: u32) {
        if retry == 0 {
            self.bar.set_message(method.to_string());
        } else {
            self.bar.set_message(format!("{method} (retry {retry})"));
        }
    }

    fn on_attempt_complete(&self, method: &str, _artifact: &Path, size_bytes: u64) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            green("✓"),
            method,
            dim(&format!("{size_bytes} bytes"))
        ));
    }

    fn on_attempt_error(&self, method: &str, error: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<10} {}", red("✗"), method, red(&msg)));
    }

    fn on_conversion_complete(&self, attempts: usize, succeeded: bool) {
        self.bar.finish_and_clear();
        if !succeeded {
            eprintln!("{} all {} attempt(s) failed", red("✘"), attempts);
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a scraped article next to the current directory
  web2ink article.json

  # Choose the output file (extension follows the artifact kind)
  web2ink article.json -o ~/inbox/article.rm

  # Read the record from stdin, attach a QR code
  scraper https://example.com/post | web2ink - --qr /tmp/qr.png

  # Inspect the drawing script without running the renderer
  web2ink --script-only article.json

  # Convert and upload to the device cloud
  web2ink article.json --upload --folder /Articles

INPUT FORMAT:
  {
    "title": "…", "url": "https://…", "qr_image": "/path/or/url",
    "structured_content": [ {"type": "h2", "content": "…"}, … ],
    "images": [ {"id": "img_0", "src": "https://…"} ]
  }

ENVIRONMENT VARIABLES:
  WEB2INK_RENDERER   Path to the drawj2d executable
  WEB2INK_RMAPI      Path to the rmapi executable
  WEB2INK_FOLDER     Upload folder on the device cloud
  RUST_LOG           Override log filtering (e.g. web2ink=debug)
"#;

/// Convert scraped web content into native e-ink documents.
#[derive(Parser, Debug)]
#[command(
    name = "web2ink",
    version,
    about = "Convert scraped web content into native e-ink documents",
    long_about = "Lay out a scraped content record (JSON) on the tablet's page geometry, \
render it with drawj2d into a native ink file, and fall back to a document package or a \
PDF when direct conversion fails.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Content record JSON file, or `-` for stdin.
    input: String,

    /// Write the artifact here (extension is replaced by the artifact kind).
    #[arg(short, long, env = "WEB2INK_OUTPUT")]
    output: Option<PathBuf>,

    /// Path to the drawj2d renderer.
    #[arg(long, env = "WEB2INK_RENDERER", default_value = DEFAULT_RENDERER_PATH)]
    renderer: PathBuf,

    /// Page width in device pixels.
    #[arg(long, env = "WEB2INK_PAGE_WIDTH", default_value_t = 1872.0)]
    page_width: f32,

    /// Page height in device pixels.
    #[arg(long, env = "WEB2INK_PAGE_HEIGHT", default_value_t = 2404.0)]
    page_height: f32,

    /// Margin on every side, in device pixels.
    #[arg(long, env = "WEB2INK_MARGIN", default_value_t = 120.0)]
    margin: f32,

    /// Body line height.
    #[arg(long, env = "WEB2INK_LINE_HEIGHT", default_value_t = 35.0)]
    line_height: f32,

    /// Heading and title line height.
    #[arg(long, env = "WEB2INK_HEADER_LINE_HEIGHT", default_value_t = 55.0)]
    header_line_height: f32,

    /// Font family for the title and headings.
    #[arg(long, env = "WEB2INK_HEADING_FONT")]
    heading_font: Option<String>,

    /// Font family for body text.
    #[arg(long, env = "WEB2INK_BODY_FONT")]
    body_font: Option<String>,

    /// Font family for blockquotes and captions.
    #[arg(long, env = "WEB2INK_EMPHASIS_FONT")]
    emphasis_font: Option<String>,

    /// Font family for code blocks.
    #[arg(long, env = "WEB2INK_CODE_FONT")]
    code_font: Option<String>,

    /// Reject artifacts smaller than this many bytes.
    #[arg(long, env = "WEB2INK_MIN_ARTIFACT_BYTES", default_value_t = 50)]
    min_artifact_bytes: u64,

    /// Retries per conversion method (and per upload).
    #[arg(long, env = "WEB2INK_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Base backoff delay between retries, doubled each retry.
    #[arg(long, env = "WEB2INK_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    /// Reset to the top margin instead of emitting page breaks.
    #[arg(long, env = "WEB2INK_NO_PAGE_BREAKS")]
    no_page_breaks: bool,

    /// Skip the package (.rmdoc) fallback.
    #[arg(long, env = "WEB2INK_NO_PACKAGE")]
    no_package: bool,

    /// Skip the PDF fallback.
    #[arg(long, env = "WEB2INK_NO_PDF")]
    no_pdf: bool,

    /// Stamp "Generated: <local time>" on the bottom margin of the last page.
    #[arg(long, env = "WEB2INK_STAMP")]
    stamp: bool,

    /// Reference (QR) image placed in the top-right corner; path or URL.
    #[arg(long, env = "WEB2INK_QR")]
    qr: Option<String>,

    /// Source URL printed under the title, overriding the record's.
    #[arg(long)]
    source_url: Option<String>,

    /// Directory for temporary files.
    #[arg(long, env = "WEB2INK_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Image download timeout in seconds.
    #[arg(long, env = "WEB2INK_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// Print the drawing script and exit.
    #[arg(long)]
    script_only: bool,

    /// Print the structured result (PipelineOutput) as JSON on stdout.
    #[arg(long, env = "WEB2INK_JSON")]
    json: bool,

    /// Upload the artifact with rmapi after conversion.
    #[arg(long, env = "WEB2INK_UPLOAD")]
    upload: bool,

    /// Path to the rmapi executable.
    #[arg(long, env = "WEB2INK_RMAPI", default_value = "rmapi")]
    rmapi: PathBuf,

    /// Upload folder on the device cloud.
    #[arg(long, env = "WEB2INK_FOLDER", default_value = "/")]
    folder: String,

    /// Disable the progress spinner.
    #[arg(long, env = "WEB2INK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "WEB2INK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "WEB2INK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports each attempt, so library INFO logs are
    // muted while it runs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.script_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Read input ───────────────────────────────────────────────────────
    let json = read_input(&cli.input)?;
    let json = apply_overrides(&json, &cli)?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Script-only mode ─────────────────────────────────────────────────
    if cli.script_only {
        let doc = ContentDocument::from_json(&json).context("Invalid content record")?;
        io::stdout()
            .lock()
            .write_all(render_script(&doc, &config).as_bytes())
            .context("Failed to write to stdout")?;
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let output = match convert_json(&json, &config).await {
        Ok(output) => output,
        Err(InkError::ConversionExhausted { attempts }) => {
            for a in &attempts {
                if let web2ink::AttemptOutcome::Failure(e) = &a.outcome {
                    eprintln!("  {} {:<10} {}", red("✗"), a.method, e);
                }
            }
            anyhow::bail!("Conversion failed: all {} attempt(s) failed", attempts.len());
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    let ext = output.artifact.kind.extension();
    let dest = match &cli.output {
        Some(path) => path.with_extension(ext),
        // Titles may contain dots, so the extension is appended rather than replaced.
        None => PathBuf::from(format!("{}.{}", safe_title(&output.title), ext)),
    };
    let written = output
        .persist(&dest)
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  {} page(s)  {} attempt(s)  {}ms  →  {}",
            green("✔"),
            output.artifact.method,
            output.stats.page_count,
            output.stats.attempt_count,
            output.stats.total_duration_ms,
            bold(&written.display().to_string()),
        );
    }

    // ── Upload ───────────────────────────────────────────────────────────
    if cli.upload {
        let uploader = Arc::new(RmapiUploader::new(&cli.rmapi, &cli.folder));
        let receipt = deliver(&output, uploader, &config)
            .await
            .context("Upload failed")?;
        if !cli.quiet {
            eprintln!("{}  {}  →  {}", green("✔"), receipt.message, cli.folder);
        }
    }

    Ok(())
}

/// Read the record from a file, or stdin for `-`.
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}

/// Fold `--qr` and `--source-url` into the record before parsing.
fn apply_overrides(json: &str, cli: &Cli) -> Result<String> {
    if cli.qr.is_none() && cli.source_url.is_none() {
        return Ok(json.to_string());
    }
    let mut value: serde_json::Value =
        serde_json::from_str(json).context("Input is not valid JSON")?;
    let obj = value
        .as_object_mut()
        .context("Input must be a JSON object")?;
    if let Some(qr) = &cli.qr {
        obj.insert("qr_image".into(), qr.clone().into());
    }
    if let Some(url) = &cli.source_url {
        obj.insert("url".into(), url.clone().into());
    }
    Ok(value.to_string())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let defaults = FontConfig::default();
    let heading = cli.heading_font.clone();
    let fonts = FontConfig {
        title_family: heading.clone().unwrap_or(defaults.title_family.clone()),
        heading_family: heading.unwrap_or(defaults.heading_family.clone()),
        body_family: cli.body_font.clone().unwrap_or(defaults.body_family.clone()),
        emphasis_family: cli
            .emphasis_font
            .clone()
            .unwrap_or(defaults.emphasis_family.clone()),
        code_family: cli.code_font.clone().unwrap_or(defaults.code_family.clone()),
        ..defaults
    };

    let mut builder = PipelineConfig::builder()
        .page_size(cli.page_width, cli.page_height)
        .margin(cli.margin)
        .line_height(cli.line_height)
        .header_line_height(cli.header_line_height)
        .fonts(fonts)
        .pagination(if cli.no_page_breaks {
            PaginationMode::Overlap
        } else {
            PaginationMode::PageBreaks
        })
        .renderer_path(&cli.renderer)
        .enable_packaging(!cli.no_package)
        .enable_pdf_fallback(!cli.no_pdf)
        .min_artifact_bytes(cli.min_artifact_bytes)
        .max_retries(cli.max_retries)
        .retry_delay_ms(cli.retry_delay_ms)
        .download_timeout_secs(cli.download_timeout);

    if let Some(dir) = &cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if cli.stamp {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        builder = builder.footer(format!("Generated: {now}"));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
