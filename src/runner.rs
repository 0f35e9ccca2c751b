use crate::{
    analyzer::{AnalyzeRequest, Analyzer, AnalyzerError},
    config::RunOptions,
    discover::{InputFile, discover},
    gate::{GateDecision, IdempotencyGate},
    interrupt,
    progress::{ProgressDisplay, ProgressTracker},
    report::JobResult,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives discovery, gating and analysis for one directory, one file at a time.
pub struct JobRunner<A: Analyzer> {
    opts: RunOptions,
    gate: IdempotencyGate,
    analyzer: A,
    show_progress: bool,
}

#[derive(Debug)]
pub enum BatchOutcome {
    /// Discovery found no candidates; nothing ran and no report is due.
    NothingToDo,
    Completed(BatchRun),
    /// Stopped by an interrupt after `finished` of `total` files; no report
    /// is due.
    Interrupted { finished: usize, total: usize },
}

#[derive(Debug, Clone)]
pub struct BatchRun {
    pub results: Vec<JobResult>,
    pub total_duration: Duration,
    /// Mean over successful analyses only.
    pub average_duration: Option<Duration>,
}

impl BatchRun {
    pub fn errors(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.is_error())
    }
}

impl<A: Analyzer> JobRunner<A> {
    pub fn new(opts: &RunOptions, analyzer: A) -> Self {
        Self {
            gate: IdempotencyGate::new(&opts.extension, &opts.output_suffix, opts.force),
            opts: opts.clone(),
            analyzer,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn run_batch(&self, root: &Path) -> BatchOutcome {
        let started = Instant::now();
        let files = discover(root, &self.opts.extension, self.opts.recursive);
        if files.is_empty() {
            info!(root = %root.display(), extension = %self.opts.extension, "no candidate files found");
            return BatchOutcome::NothingToDo;
        }
        info!(
            "found {} .{} file(s) under {}",
            files.len(),
            self.opts.extension,
            root.display()
        );
        self.run_files(&files, started)
    }

    /// Processes `files` in order. Every file yields exactly one result and no
    /// single failure stops the loop; only an interrupt does.
    pub fn run_files(&self, files: &[InputFile], started: Instant) -> BatchOutcome {
        let mut tracker = ProgressTracker::starting_at(files.len(), started);
        let display = ProgressDisplay::new(files.len(), self.show_progress);
        let mut results = Vec::with_capacity(files.len());

        for (i, file) in files.iter().enumerate() {
            let name = file.display_name();
            if interrupt::requested() {
                display.finish();
                return interrupted(i, files.len());
            }
            display.render(&tracker.update(i, &name));

            match self.run_one(file, &mut tracker) {
                Some(result) => results.push(result),
                None => {
                    display.finish();
                    return interrupted(i, files.len());
                }
            }

            display.render(&tracker.update(i + 1, &name));
        }
        display.finish();

        BatchOutcome::Completed(BatchRun {
            results,
            total_duration: started.elapsed(),
            average_duration: tracker.average_duration(),
        })
    }

    /// `None` when an interrupt stopped the analyzer mid-file.
    fn run_one(&self, file: &InputFile, tracker: &mut ProgressTracker) -> Option<JobResult> {
        let name = file.display_name();
        let output = match self.gate.decide(file) {
            GateDecision::Skip { output } => {
                debug!(file = %name, output = %output.display(), "skipping, already analyzed");
                return Some(JobResult::skipped(name, &output));
            }
            GateDecision::Process { output } => output,
        };

        let req = AnalyzeRequest {
            input: &file.path,
            delay_seconds: self.opts.delay,
            frame_skip: self.opts.frame_skip,
            output: &output,
        };
        debug!(file = %name, bytes = file.size, "analyzing");

        let started = Instant::now();
        match self.analyzer.analyze(&req) {
            Ok(_) => {
                let elapsed = started.elapsed();
                if !output.exists() {
                    warn!(file = %name, output = %output.display(), "analyzer succeeded but wrote no output");
                }
                tracker.record_completion(elapsed);
                debug!(file = %name, secs = elapsed.as_secs_f64(), "analysis finished");
                Some(JobResult::success(name, elapsed, &output))
            }
            Err(AnalyzerError::Interrupted) => None,
            Err(err) => {
                let diagnostics = err.diagnostics().map(str::to_string);
                match &diagnostics {
                    Some(text) => warn!(file = %name, "analysis failed: {err}\n{text}"),
                    None => warn!(file = %name, "analysis failed: {err}"),
                }
                Some(JobResult::error(name, &output, err.to_string(), diagnostics))
            }
        }
    }
}

fn interrupted(finished: usize, total: usize) -> BatchOutcome {
    warn!("interrupted after {finished} of {total} file(s)");
    BatchOutcome::Interrupted { finished, total }
}
