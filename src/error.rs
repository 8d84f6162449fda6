use std::path::PathBuf;

use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `stampbot`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; transport and application code continue
/// to use `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum StampError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Render ──────────────────────────────────────────────────────────
    #[error("render: {0}")]
    Render(#[from] RenderError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("bot token missing (set telegram.bot_token or the BOT_TOKEN env var)")]
    MissingToken,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Render errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("failed to decode template {path}: {message}")]
    TemplateDecode { path: String, message: String },

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to encode artifact: {0}")]
    Encode(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, StampError>;
