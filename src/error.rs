use crate::config::ConfigError;
use crate::partial::ParseError;

/// Errors surfaced by the assembler API.
#[derive(Debug, thiserror::Error)]
pub enum AssemblerError {
    /// The buffer stopped being JSON; the session ended in `error`.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("No Tokio runtime available to drive the session")]
    NoRuntime,
    #[error("Session is closed")]
    SessionClosed,
}
