//! Pipeline stages for content-to-ink conversion.
//!
//! Each submodule implements one transformation step. Layout and
//! serialization are pure; everything touching disk or processes lives in
//! the later stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ layout ──▶ script ──▶ orchestrate ──▶ artifact
//! (images)  (commands) (text)     (renderer, package, pdf)
//! ```
//!
//! 1. [`input`]:       fetch or decode image sources into the request workspace
//! 2. [`layout`]:      place text, rules and images on fixed-size pages
//! 3. [`script`]:      serialize draw commands into the renderer's script dialect
//! 4. [`orchestrate`]: run the renderer method by method with retry/backoff,
//!    then the [`package`] and PDF fallbacks
//!
//! [`sanitize`] holds the text rules shared by layout and serialization;
//! [`renderer`] is the process seam the orchestrator drives; [`workspace`]
//! owns the per-request temporary directory.

pub mod input;
pub mod layout;
pub mod orchestrate;
pub mod package;
pub mod renderer;
pub mod sanitize;
pub mod script;
pub mod workspace;
