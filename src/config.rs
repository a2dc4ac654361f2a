//! Configuration types for the content-to-ink pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Nothing is read from process-wide state:
//! page geometry, font names, renderer location and retry budget all travel
//! in this one struct, which makes two runs trivially comparable and lets
//! concurrent requests use different device profiles.

use crate::error::InkError;
use crate::pipeline::renderer::Renderer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default location of the drawj2d renderer.
pub const DEFAULT_RENDERER_PATH: &str = "/usr/local/bin/drawj2d";

// ── Page geometry ────────────────────────────────────────────────────────

/// Page size and vertical rhythm in device pixels.
///
/// Defaults describe a reMarkable Pro in portrait orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub line_height: f32,
    pub header_line_height: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 1872.0,
            height: 2404.0,
            margin: 120.0,
            line_height: 35.0,
            header_line_height: 55.0,
        }
    }
}

impl PageGeometry {
    /// Horizontal space between the left and right margins.
    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    /// Lowest y coordinate text may be placed at.
    pub fn bottom(&self) -> f32 {
        self.height - self.margin
    }
}

// ── Typography ───────────────────────────────────────────────────────────

/// Font families per role plus the size ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    pub title_family: String,
    pub heading_family: String,
    pub body_family: String,
    /// Italic style used for blockquotes, captions and notices.
    pub emphasis_family: String,
    /// Monospace style used for code blocks.
    pub code_family: String,
    pub title_size: f32,
    /// Size of a level-1 heading; deeper levels step down from here.
    pub h1_size: f32,
    pub heading_step: f32,
    pub body_size: f32,
    pub code_size: f32,
    pub caption_size: f32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            title_family: "Lines-Bold".into(),
            heading_family: "Lines-Bold".into(),
            body_family: "Lines".into(),
            emphasis_family: "Lines-Italic".into(),
            code_family: "DejaVu Sans Mono".into(),
            title_size: 36.0,
            h1_size: 32.0,
            heading_step: 4.0,
            body_size: 18.0,
            code_size: 16.0,
            caption_size: 16.0,
        }
    }
}

/// Wrap widths in characters.
///
/// Glyph metrics are unknown at layout time, so a character budget per line
/// stands in for pixel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapWidths {
    pub paragraph: usize,
    /// Lists and blockquotes, which lose room to an indent or prefix.
    pub narrow: usize,
    pub heading: usize,
    /// Titles are truncated to this many characters.
    pub title: usize,
}

impl Default for WrapWidths {
    fn default() -> Self {
        Self {
            paragraph: 70,
            narrow: 65,
            heading: 48,
            title: 80,
        }
    }
}

/// What the layout engine does when the cursor runs off the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaginationMode {
    /// Emit a page-break command and continue at the top margin. (default)
    #[default]
    PageBreaks,
    /// Jump back to the top margin without a page break. For renderer targets
    /// that cannot produce multi-page documents; later lines overlap earlier
    /// ones rather than being dropped.
    Overlap,
}

/// Everything the layout engine needs. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub geometry: PageGeometry,
    pub fonts: FontConfig,
    pub wrap: WrapWidths,
    pub pagination: PaginationMode,
    /// Horizontal offset for list continuation lines, quotes and code.
    pub indent: f32,
    /// Upper bound for the display width of embedded images.
    pub max_image_width: f32,
    /// Edge length of the square reference (QR) image in the top-right corner.
    pub reference_image_size: f32,
    /// Optional line drawn at the bottom margin of the last page.
    #[serde(default)]
    pub footer: Option<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::with_geometry(PageGeometry::default())
    }
}

impl LayoutConfig {
    /// Default typography and wrapping with a specific page geometry.
    pub fn with_geometry(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            fonts: FontConfig::default(),
            wrap: WrapWidths::default(),
            pagination: PaginationMode::default(),
            indent: 20.0,
            max_image_width: 500.0,
            reference_image_size: 350.0,
            footer: None,
        }
    }
}

// ── Conversion methods ───────────────────────────────────────────────────

/// Output format a renderer invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    Ink,
    Pdf,
}

/// One invocation-argument profile of the external renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionMethod {
    pub name: String,
    pub target: OutputTarget,
    /// Flags placed before `-o <output> <script>`.
    pub flags: Vec<String>,
    /// Extension of the file this method writes.
    pub extension: String,
}

impl ConversionMethod {
    pub fn new(
        name: impl Into<String>,
        target: OutputTarget,
        flags: &[&str],
        extension: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            extension: extension.into(),
        }
    }

    /// Native ink at device resolution, v6 page format. Highest fidelity.
    pub fn native() -> Self {
        Self::new("native", OutputTarget::Ink, &["-Trm", "-r229", "-rmv6"], "rm")
    }

    /// Ink target with no device-specific flags.
    pub fn basic() -> Self {
        Self::new("basic", OutputTarget::Ink, &["-Trm"], "rm")
    }

    /// Ink page destined to be wrapped into a package.
    pub fn fragment() -> Self {
        Self::new("fragment", OutputTarget::Ink, &["-Trm", "-rmv6"], "rm")
    }

    /// Lower-fidelity but universally displayable PDF.
    pub fn pdf() -> Self {
        Self::new("pdf", OutputTarget::Pdf, &["-Tpdf"], "pdf")
    }

    /// Full argument list for rendering `script` into `output`.
    pub fn arguments(&self, output: &Path, script: &Path) -> Vec<String> {
        let mut args = self.flags.clone();
        args.push("-o".to_string());
        args.push(output.to_string_lossy().into_owned());
        args.push(script.to_string_lossy().into_owned());
        args
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Bounded retry with exponential backoff, applied to every renderer method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra invocations after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each one.
    pub base_delay_ms: u64,
    /// Cap on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base × 2^(retry-1)`,
    /// capped at `max_delay_ms`. Retry 0 is the first try and never waits.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(retry - 1);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Longest time one method can spend sleeping between retries.
    pub fn worst_case_backoff(&self) -> Duration {
        (1..=self.max_retries).map(|r| self.delay_for(r)).sum()
    }
}

// ── Pipeline config ──────────────────────────────────────────────────────

/// Configuration for one content-to-ink conversion.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use web2ink::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .margin(100.0)
///     .max_retries(1)
///     .renderer_path("/opt/drawj2d/drawj2d")
///     .build()
///     .unwrap();
/// assert_eq!(config.layout.geometry.margin, 100.0);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    pub layout: LayoutConfig,

    /// Path (or bare name looked up on `PATH`) of the renderer executable.
    pub renderer_path: PathBuf,

    /// Pre-constructed renderer. Takes precedence over `renderer_path`.
    pub renderer: Option<Arc<dyn Renderer>>,

    /// Direct ink methods, tried in order.
    pub methods: Vec<ConversionMethod>,

    /// Profile used to render the fragment for the packaging fallback.
    pub fragment_method: ConversionMethod,

    /// Profile used for the last-resort PDF fallback.
    pub pdf_method: ConversionMethod,

    /// Try the packaging fallback once every direct method failed. Default: true.
    pub enable_packaging: bool,

    /// Try the PDF fallback once packaging failed. Default: true.
    pub enable_pdf_fallback: bool,

    /// Artifacts smaller than this are header-only files. Default: 50.
    ///
    /// An ink file with no strokes is just its fixed header, so a renderer
    /// that "succeeds" on a script it could not interpret leaves a file of a
    /// few dozen bytes behind. Such output is a soft failure.
    pub min_artifact_bytes: u64,

    pub retry: RetryPolicy,

    /// Parent directory for request workspaces. System temp dir if `None`.
    pub temp_dir: Option<PathBuf>,

    /// Timeout for downloading remote images, in seconds. Default: 30.
    pub download_timeout_secs: u64,

    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            renderer_path: PathBuf::from(DEFAULT_RENDERER_PATH),
            renderer: None,
            methods: vec![ConversionMethod::native(), ConversionMethod::basic()],
            fragment_method: ConversionMethod::fragment(),
            pdf_method: ConversionMethod::pdf(),
            enable_packaging: true,
            enable_pdf_fallback: true,
            min_artifact_bytes: 50,
            retry: RetryPolicy::default(),
            temp_dir: None,
            download_timeout_secs: 30,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("layout", &self.layout)
            .field("renderer_path", &self.renderer_path)
            .field("renderer", &self.renderer.as_ref().map(|_| "<dyn Renderer>"))
            .field("methods", &self.methods)
            .field("fragment_method", &self.fragment_method)
            .field("pdf_method", &self.pdf_method)
            .field("enable_packaging", &self.enable_packaging)
            .field("enable_pdf_fallback", &self.enable_pdf_fallback)
            .field("min_artifact_bytes", &self.min_artifact_bytes)
            .field("retry", &self.retry)
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Number of stages the orchestrator may walk through.
    pub fn stage_count(&self) -> usize {
        self.methods.len() + usize::from(self.enable_packaging) + usize::from(self.enable_pdf_fallback)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn geometry(mut self, geometry: PageGeometry) -> Self {
        self.config.layout.geometry = geometry;
        self
    }

    pub fn page_size(mut self, width: f32, height: f32) -> Self {
        self.config.layout.geometry.width = width;
        self.config.layout.geometry.height = height;
        self
    }

    pub fn margin(mut self, margin: f32) -> Self {
        self.config.layout.geometry.margin = margin.max(0.0);
        self
    }

    pub fn line_height(mut self, px: f32) -> Self {
        self.config.layout.geometry.line_height = px;
        self
    }

    pub fn header_line_height(mut self, px: f32) -> Self {
        self.config.layout.geometry.header_line_height = px;
        self
    }

    pub fn fonts(mut self, fonts: FontConfig) -> Self {
        self.config.layout.fonts = fonts;
        self
    }

    pub fn wrap_widths(mut self, wrap: WrapWidths) -> Self {
        self.config.layout.wrap = wrap;
        self
    }

    pub fn pagination(mut self, mode: PaginationMode) -> Self {
        self.config.layout.pagination = mode;
        self
    }

    /// Text stamped at the bottom margin of the last page.
    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.config.layout.footer = Some(text.into());
        self
    }

    pub fn renderer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.renderer_path = path.into();
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn methods(mut self, methods: Vec<ConversionMethod>) -> Self {
        self.config.methods = methods;
        self
    }

    pub fn fragment_method(mut self, method: ConversionMethod) -> Self {
        self.config.fragment_method = method;
        self
    }

    pub fn pdf_method(mut self, method: ConversionMethod) -> Self {
        self.config.pdf_method = method;
        self
    }

    pub fn enable_packaging(mut self, v: bool) -> Self {
        self.config.enable_packaging = v;
        self
    }

    pub fn enable_pdf_fallback(mut self, v: bool) -> Self {
        self.config.enable_pdf_fallback = v;
        self
    }

    pub fn min_artifact_bytes(mut self, n: u64) -> Self {
        self.config.min_artifact_bytes = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    /// Base backoff delay. Raises the cap when it would sit below the base.
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self.config.retry.max_delay_ms = self.config.retry.max_delay_ms.max(ms);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, InkError> {
        let c = &self.config;
        let g = &c.layout.geometry;
        if g.width <= 2.0 * g.margin || g.height <= 2.0 * g.margin {
            return Err(InkError::InvalidConfig(format!(
                "Page {}×{} leaves no room inside a {} margin",
                g.width, g.height, g.margin
            )));
        }
        if g.line_height <= 0.0 || g.header_line_height <= 0.0 {
            return Err(InkError::InvalidConfig(
                "Line heights must be positive".into(),
            ));
        }
        let w = &c.layout.wrap;
        if w.paragraph == 0 || w.narrow == 0 || w.heading == 0 || w.title == 0 {
            return Err(InkError::InvalidConfig(
                "Wrap widths must be ≥ 1 character".into(),
            ));
        }
        if c.stage_count() == 0 {
            return Err(InkError::InvalidConfig(
                "No conversion method and every fallback disabled".into(),
            ));
        }
        if c.retry.base_delay_ms > c.retry.max_delay_ms {
            return Err(InkError::InvalidConfig(format!(
                "Retry base delay {}ms exceeds the {}ms cap",
                c.retry.base_delay_ms, c.retry.max_delay_ms
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_device_profile() {
        let g = PageGeometry::default();
        assert_eq!((g.width, g.height, g.margin), (1872.0, 2404.0, 120.0));
        assert_eq!(g.content_width(), 1632.0);
        assert_eq!(g.bottom(), 2284.0);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 500,
        };
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(4), Duration::from_millis(500));
        assert_eq!(p.worst_case_backoff(), Duration::from_millis(1700));
    }

    #[test]
    fn method_arguments_end_with_output_and_script() {
        let args = ConversionMethod::native()
            .arguments(Path::new("/tmp/out.rm"), Path::new("/tmp/doc.hcl"));
        assert_eq!(
            args,
            vec!["-Trm", "-r229", "-rmv6", "-o", "/tmp/out.rm", "/tmp/doc.hcl"]
        );
    }

    #[test]
    fn builder_rejects_margin_wider_than_page() {
        let err = PipelineConfig::builder()
            .page_size(200.0, 200.0)
            .margin(100.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, InkError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_empty_plan() {
        let err = PipelineConfig::builder()
            .methods(vec![])
            .enable_packaging(false)
            .enable_pdf_fallback(false)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("No conversion method"));
    }

    #[test]
    fn long_retry_delay_raises_cap() {
        let config = PipelineConfig::builder()
            .retry_delay_ms(60_000)
            .build()
            .unwrap();
        assert_eq!(config.retry.base_delay_ms, 60_000);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.retry.delay_for(1), Duration::from_millis(60_000));

        let config = PipelineConfig::builder().retry_delay_ms(10).build().unwrap();
        assert_eq!(config.retry.max_delay_ms, RetryPolicy::default().max_delay_ms);
    }

    #[test]
    fn stage_count_includes_fallbacks() {
        let config = PipelineConfig::default();
        assert_eq!(config.stage_count(), 4);
        let config = PipelineConfig::builder()
            .enable_pdf_fallback(false)
            .build()
            .unwrap();
        assert_eq!(config.stage_count(), 3);
    }
}
