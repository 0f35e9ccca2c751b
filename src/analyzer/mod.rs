pub mod command;

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use command::CommandAnalyzer;

/// Everything the external analyzer receives for one file.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeRequest<'a> {
    pub input: &'a Path,
    pub delay_seconds: f64,
    pub frame_skip: u32,
    pub output: &'a Path,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("failed to spawn analyzer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("analyzer exited with {status}")]
    Exit { status: String, stderr: String },
    #[error("analyzer output exceeded capture limit of {limit} bytes")]
    CaptureOverflow { limit: usize, stderr: String },
    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration, String),
    #[error("analyzer stopped by interrupt")]
    Interrupted,
    #[error("analyzer i/o error: {0}")]
    Io(String),
}

impl AnalyzerError {
    /// Text captured from the analyzer's error stream, if any was collected.
    pub fn diagnostics(&self) -> Option<&str> {
        let text = match self {
            AnalyzerError::Exit { stderr, .. } => stderr,
            AnalyzerError::CaptureOverflow { stderr, .. } => stderr,
            AnalyzerError::Timeout(_, stderr) => stderr,
            AnalyzerError::Spawn { .. } | AnalyzerError::Interrupted | AnalyzerError::Io(_) => {
                return None;
            }
        };
        let trimmed = text.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }
}

/// The per-file analysis step. Implementations must leave their text output
/// at `req.output` when they return `Ok`.
pub trait Analyzer {
    fn analyze(&self, req: &AnalyzeRequest<'_>) -> Result<AnalyzeOutput, AnalyzerError>;
}

impl<A: Analyzer + ?Sized> Analyzer for &A {
    fn analyze(&self, req: &AnalyzeRequest<'_>) -> Result<AnalyzeOutput, AnalyzerError> {
        (**self).analyze(req)
    }
}
