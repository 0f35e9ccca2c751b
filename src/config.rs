use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default)]
    pub analyzer: Analyzer,
    #[serde(default)]
    pub report: Report,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("parsing TOML: {}", path.display()))?;
        Ok(cfg)
    }

    /// The options a single batch run is executed with, as echoed into the report.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            delay: self.analysis.delay_seconds,
            frame_skip: self.analysis.frame_skip,
            force: self.analysis.force,
            recursive: self.scan.recursive,
            extension: self.scan.extension.trim_start_matches('.').to_string(),
            output_suffix: self.analysis.output_suffix.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub delay: f64,
    pub frame_skip: u32,
    pub force: bool,
    pub recursive: bool,
    pub extension: String,
    pub output_suffix: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Config::default().run_options()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scan {
    pub extension: String,
    pub recursive: bool,
}
impl Default for Scan {
    fn default() -> Self {
        Self {
            extension: "mp4".into(),
            recursive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    pub delay_seconds: f64,
    pub frame_skip: u32,
    pub force: bool,
    pub output_suffix: String,
}
impl Default for Analysis {
    fn default() -> Self {
        Self {
            delay_seconds: 0.0,
            frame_skip: 30,
            force: false,
            output_suffix: "_analysis.txt".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Analyzer {
    pub program: String,
    /// Argument template; `{input}`, `{delay}`, `{frame_skip}` and `{output}` are substituted.
    pub args: Vec<String>,
    pub capture_limit_bytes: usize,
    pub timeout_seconds: u64,
    pub env: BTreeMap<String, String>,
}
impl Default for Analyzer {
    fn default() -> Self {
        Self {
            program: "video-analyzer".into(),
            args: vec![
                "{input}".into(),
                "--delay".into(),
                "{delay}".into(),
                "--frame-skip".into(),
                "{frame_skip}".into(),
                "--output".into(),
                "{output}".into(),
            ],
            capture_limit_bytes: 10 * 1024 * 1024,
            timeout_seconds: 0,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Report {
    pub filename_prefix: String,
    pub print_summary: bool,
}
impl Default for Report {
    fn default() -> Self {
        Self {
            filename_prefix: "batch-report".into(),
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub enabled: bool,
}
impl Default for Progress {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
