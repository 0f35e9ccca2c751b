use crate::discover::InputFile;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Skip { output: PathBuf },
    Process { output: PathBuf },
}

impl GateDecision {
    pub fn output(&self) -> &Path {
        match self {
            GateDecision::Skip { output } | GateDecision::Process { output } => output,
        }
    }
}

/// Decides whether an input already has its companion analysis output.
#[derive(Debug, Clone)]
pub struct IdempotencyGate {
    extension: String,
    suffix: String,
    force: bool,
}

impl IdempotencyGate {
    pub fn new(extension: &str, suffix: &str, force: bool) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            suffix: suffix.to_string(),
            force,
        }
    }

    /// `dir/clip.MP4` -> `dir/clip{suffix}`. The stem keeps its raw bytes.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = match input.extension() {
            Some(ext) if ext.eq_ignore_ascii_case(&self.extension) => input.file_stem(),
            _ => input.file_name(),
        };
        let mut file_name = stem.map(OsStr::to_os_string).unwrap_or_default();
        file_name.push(&self.suffix);
        match input.parent() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    pub fn decide(&self, file: &InputFile) -> GateDecision {
        let output = self.output_path(&file.path);
        if output.exists() && !self.force {
            GateDecision::Skip { output }
        } else {
            GateDecision::Process { output }
        }
    }
}
