//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to follow the
//! orchestrator as it walks through methods and fallbacks: a terminal
//! spinner, a log line per retry, a status field in a job table.
//!
//! # Example
//!
//! ```rust
//! use web2ink::{ConversionProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     tries: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_attempt_start(&self, method: &str, retry: u32) {
//!         self.tries.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{method} (retry {retry})");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { tries: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as it converts a script.
///
/// All methods default to no-ops so implementors override only what they
/// need. Implementations must be `Send + Sync`: requests may run on any
/// worker thread.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, before the first renderer invocation.
    ///
    /// # Arguments
    /// * `stages` : direct methods plus enabled fallbacks
    fn on_conversion_start(&self, stages: usize) {
        let _ = stages;
    }

    /// Called before every renderer invocation, retries included.
    fn on_attempt_start(&self, method: &str, retry: u32) {
        let _ = (method, retry);
    }

    /// Called when a method produced a valid artifact.
    fn on_attempt_complete(&self, method: &str, artifact: &Path, size_bytes: u64) {
        let _ = (method, artifact, size_bytes);
    }

    /// Called when a method is given up on, after its retries.
    fn on_attempt_error(&self, method: &str, error: &str) {
        let _ = (method, error);
    }

    /// Called once at the end, whatever the outcome.
    ///
    /// # Arguments
    /// * `attempts`  : methods tried
    /// * `succeeded` : whether an artifact was produced
    fn on_conversion_complete(&self, attempts: usize, succeeded: bool) {
        let _ = (attempts, succeeded);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
