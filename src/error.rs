// =============================================================================
// Error taxonomy for the Meridian engine
// =============================================================================
//
// Recoverable classes (Transport, Protocol, RiskRejection, Execution) never
// crash the engine; Config is fatal at startup; Internal raises a kill-switch
// candidate. Each variant carries a stable reason code via `code()` plus an
// operator-readable message.
// =============================================================================

use crate::types::Platform;

/// Typed engine error. `anyhow` wraps these at the binary boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Venue rejected our credentials. Degrades that venue to read-only.
    #[error("auth error on {platform}: {message}")]
    Auth { platform: Platform, message: String },

    /// Network or WebSocket failure. Retried with backoff.
    #[error("transport error on {platform}: {message}")]
    Transport { platform: Platform, message: String },

    /// Malformed venue payload. Dropped and counted; resync when
    /// ordering-critical.
    #[error("protocol error on {platform}: {message}")]
    Protocol { platform: Platform, message: String },

    /// Pre-trade limit breach. Surfaced as order `rejected`; never retried.
    #[error("risk rejection: {0}")]
    RiskRejection(String),

    /// Partial or failed execution leg; triggers the compensating unwind.
    #[error("execution error: {0}")]
    Execution(String),

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Auth { .. } => "AUTH",
            Self::Transport { .. } => "TRANSPORT",
            Self::Protocol { .. } => "PROTOCOL",
            Self::RiskRejection(_) => "RISK_REJECTION",
            Self::Execution(_) => "EXECUTION",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the engine may keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
