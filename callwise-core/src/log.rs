//! Observational log channel.
//!
//! Every pipeline step reports what it is doing through [`log`]. Events are
//! always emitted onto `tracing` under the `callwise` target; the verbose flag
//! only decides whether informational kinds surface at `INFO` or sink to
//! `TRACE`. Nothing in here ever influences control flow.

use std::fmt;

use tracing_subscriber::EnvFilter;

/// Category of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// General progress information.
    Info,
    /// Something unexpected that the pipeline recovered from.
    Warning,
    /// A failed attempt or rejected input.
    Error,
    /// Prompt contents about to be sent.
    Prompt,
    /// A validated outcome.
    Success,
    /// The final provider response.
    Response,
    /// A failure the caller should look at.
    Critical,
    /// Lifecycle events (startup, configuration).
    System,
}

impl LogKind {
    /// Stable lowercase name, used as the `kind` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Prompt => "prompt",
            Self::Success => "success",
            Self::Response => "response",
            Self::Critical => "critical",
            Self::System => "system",
        }
    }

    /// Whether this kind keeps its severity even when verbose logging is off.
    #[must_use]
    pub fn is_severe(self) -> bool {
        matches!(self, Self::Warning | Self::Error | Self::Critical)
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emit a log event.
///
/// `verbose` mirrors the configured `debug` flag: when it is off, `info`,
/// `prompt`, `success`, `response` and `system` events are emitted at
/// `TRACE` so a default subscriber filters them out.
pub fn log(kind: LogKind, verbose: bool, message: impl fmt::Display) {
    let kind_name = kind.as_str();
    match kind {
        LogKind::Error | LogKind::Critical => {
            tracing::error!(target: "callwise", kind = kind_name, "{message}");
        }
        LogKind::Warning => {
            tracing::warn!(target: "callwise", kind = kind_name, "{message}");
        }
        _ if verbose => {
            tracing::info!(target: "callwise", kind = kind_name, "{message}");
        }
        _ => {
            tracing::trace!(target: "callwise", kind = kind_name, "{message}");
        }
    }
}

/// Install a global `tracing` subscriber for callwise output.
///
/// `RUST_LOG` wins when set; otherwise `callwise=debug` in verbose mode and
/// `callwise=info` otherwise.
///
/// # Errors
///
/// Returns an error string if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), String> {
    let fallback = if verbose { "callwise=debug" } else { "callwise=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(LogKind::Prompt.to_string(), "prompt");
        assert_eq!(LogKind::Success.as_str(), "success");
        assert_eq!(LogKind::Critical.as_str(), "critical");
    }

    #[test]
    fn only_warnings_and_errors_are_severe() {
        assert!(LogKind::Warning.is_severe());
        assert!(LogKind::Error.is_severe());
        assert!(LogKind::Critical.is_severe());
        assert!(!LogKind::Info.is_severe());
        assert!(!LogKind::Prompt.is_severe());
    }

    #[test]
    fn logging_without_subscriber_is_harmless() {
        log(LogKind::Info, false, "quiet");
        log(LogKind::Error, true, format!("loud {}", 1));
    }

    #[test]
    fn second_init_reports_error() {
        let _ = init_tracing(false);
        assert!(init_tracing(true).is_err());
    }
}
