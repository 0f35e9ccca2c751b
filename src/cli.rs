use crate::{
    analyzer::CommandAnalyzer,
    config::Config,
    interrupt,
    progress::{BarAwareStderr, format_hms},
    report::{BatchReport, JobOutcome, ReportWriter, Summary},
    runner::{BatchOutcome, BatchRun, JobRunner},
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "frame-batch", version)]
#[command(about = "Run the frame analyzer over every video in a directory tree and write a batch report")]
pub struct Args {
    /// Directory to scan. Defaults to the current directory.
    pub dir: Option<PathBuf>,

    /// Delay between frames (seconds), forwarded to the analyzer. Default 0.
    #[arg(short, long, value_name = "SECONDS")]
    pub delay: Option<f64>,

    /// Analyze every Nth frame. Default 30.
    #[arg(short = 'f', long, value_name = "N")]
    pub frame_skip: Option<u32>,

    /// Re-analyze files that already have an analysis output.
    #[arg(long)]
    pub force: bool,

    /// Descend into subdirectories (the default).
    #[arg(short, long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Only scan the top-level directory.
    #[arg(long, overrides_with = "recursive")]
    pub no_recursive: bool,

    /// Path to config TOML. If omitted, uses ./frame-batch.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

/// How a batch ended, for the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    /// Stopped by SIGINT/SIGTERM; no report was written.
    Interrupted,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Done => 0,
            RunStatus::Interrupted => 130,
        }
    }
}

pub fn dispatch(args: Args) -> Result<RunStatus> {
    let mut cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    apply_overrides(&mut cfg, &args);

    let target = match &args.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let log_path = resolve_log_path(&cfg, &target);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    let root = validate_root(&target)?;
    run(&cfg, &root)
}

/// Runs one batch over `root` and persists its report.
pub fn run(cfg: &Config, root: &Path) -> Result<RunStatus> {
    interrupt::install();
    let opts = cfg.run_options();
    info!(
        "scanning {} (extension={} recursive={} force={} delay={} frame_skip={})",
        root.display(),
        opts.extension,
        opts.recursive,
        opts.force,
        opts.delay,
        opts.frame_skip
    );

    let analyzer = CommandAnalyzer::from_config(cfg);
    let runner = JobRunner::new(&opts, analyzer).with_progress(cfg.progress.enabled);

    let run = match runner.run_batch(root) {
        BatchOutcome::NothingToDo => {
            println!("No .{} files found in {}", opts.extension, root.display());
            return Ok(RunStatus::Done);
        }
        BatchOutcome::Interrupted { finished, total } => {
            warn!("no report written; {finished} of {total} file(s) were finished and keep their outputs");
            return Ok(RunStatus::Interrupted);
        }
        BatchOutcome::Completed(run) => run,
    };

    let report = BatchReport::new(root, &opts, &run.results, run.total_duration);
    let written = ReportWriter::new(&cfg.report.filename_prefix).write(root, &report);

    if cfg.report.print_summary {
        print_summary(&report.summary, &run, written.as_ref().ok().map(PathBuf::as_path));
    }

    written.context("persisting batch report")?;
    Ok(RunStatus::Done)
}

/// CLI flags win over the config file.
pub fn apply_overrides(cfg: &mut Config, args: &Args) {
    if let Some(delay) = args.delay {
        cfg.analysis.delay_seconds = delay;
    }
    if let Some(n) = args.frame_skip {
        cfg.analysis.frame_skip = n;
    }
    if args.force {
        cfg.analysis.force = true;
    }
    if args.no_recursive {
        cfg.scan.recursive = false;
    } else if args.recursive {
        cfg.scan.recursive = true;
    }
    if let Some(level) = &args.log_level {
        cfg.logging.level = level.clone();
    }
}

/// Fails fast, before any file is touched, if `target` is not a directory.
pub fn validate_root(target: &Path) -> Result<PathBuf> {
    if !target.exists() {
        bail!("target directory does not exist: {}", target.display());
    }
    if !target.is_dir() {
        bail!("target is not a directory: {}", target.display());
    }
    target
        .canonicalize()
        .with_context(|| format!("canonicalize {}", target.display()))
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("frame-batch.toml");
    default.exists().then_some(default)
}

fn resolve_log_path(cfg: &Config, target: &Path) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    // Only log into the target once we know it is a real directory.
    target.is_dir().then(|| target.join("frame-batch.log"))
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(BarAwareStderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(BarAwareStderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn print_summary(summary: &Summary, run: &BatchRun, report_path: Option<&Path>) {
    println!();
    println!("Batch complete");
    println!("  Total files:  {}", summary.total_files);
    println!("  Successful:   {}", summary.successful);
    println!("  Skipped:      {}", summary.skipped);
    println!("  Errors:       {}", summary.errors);
    println!(
        "  Total time:   {} ({:.2}s)",
        format_hms(run.total_duration),
        summary.total_duration
    );
    if let Some(avg) = run.average_duration {
        println!("  Avg per file: {:.2}s", avg.as_secs_f64());
    }

    let mut errors = run.errors().peekable();
    if errors.peek().is_some() {
        println!();
        println!("Failed files:");
        for r in errors {
            if let JobOutcome::Error { error, .. } = &r.outcome {
                println!("  {}: {}", r.file, error);
            }
        }
    }

    if let Some(path) = report_path {
        println!();
        println!("Report: {}", path.display());
    }
}
