//! # Component Preview Pipeline
//!
//! Turns a single pasted component source file into a self-contained HTML
//! document that renders it inside a locked-down iframe, and drives that
//! document's lifecycle from the host side.
//!
//! ## Pipeline
//!
//! ```text
//! source ─▶ validate ─▶ transform ─▶ synthesize stubs ─▶ build document ─▶ sandbox
//!              │                                                             │
//!              └── analysis report                        Ready / Error ◀────┘
//! ```
//!
//! ## Invariants
//!
//! 1. **Pure request path**: [`PreviewService::generate`] never panics and never
//!    returns `Err`. Rejections come back as a failure response that still
//!    carries any analysis computed so far.
//!
//! 2. **Single entry**: every generated document assigns at most one value to
//!    `window.__PREVIEW_ENTRY__`. The sandbox mounts that value, or falls back
//!    to the detected component name, or shows a placeholder.
//!
//! 3. **No undefined names**: every capitalized tag, import binding and
//!    runtime-discovered symbol the source does not bind itself gets a stub
//!    declaration before the component code runs.
//!
//! 4. **Session scoping**: each document embeds its channel and session id and
//!    posts lifecycle messages only under that token. The host routes by token,
//!    so messages from a superseded document are never observed.
//!
//! 5. **Deterministic output**: identical source, config and known symbols
//!    produce identical documents apart from the session token.
//!
//! 6. **Best-effort rewriting**: type stripping is textual. Code it cannot fully
//!    strip surfaces as a syntax error inside the sandbox, not as a host-side
//!    failure.

pub mod analyze;
pub mod cache;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;
pub mod source;
pub mod stubs;
pub mod transform;
pub mod validate;

#[cfg(feature = "napi")]
mod native;

#[cfg(test)]
mod controller_tests;
#[cfg(test)]
mod document_tests;

pub use analyze::AnalysisReport;
pub use config::PreviewConfig;
pub use controller::{
    spawn_controller, ControllerHandle, ControllerOptions, ControllerStatus, PreviewBackend,
    PreviewState,
};
pub use document::{build_document, DocumentInput, PreviewDocument, SandboxFrame};
pub use error::{ErrorKind, PreviewError, Result};
pub use protocol::{ChannelToken, Envelope, LifecycleMessage, MessageBus, SandboxError};
pub use service::{PreviewRequest, PreviewResponse, PreviewService};
pub use session::PreviewSession;
pub use source::SourceUnit;
pub use stubs::{StubRegistry, SymbolResolver};
pub use transform::{EntryPoint, TransformPipeline};
pub use validate::{validate, ValidationIssue, ValidationResult};

#[cfg(feature = "napi")]
pub use native::{
    analyze_component_native, generate_preview_native, generate_preview_with_config_native,
};
