use frame_batch::analyzer::{AnalyzeOutput, AnalyzeRequest, Analyzer, AnalyzerError};
use frame_batch::config::RunOptions;
use frame_batch::report::{BatchReport, JobOutcome, ReportWriter, SKIP_REASON, Summary};
use frame_batch::runner::{BatchOutcome, BatchRun, JobRunner};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// In-process stand-in for the analyzer binary. Writes the output file unless
/// the input's name is listed in `fail_on`.
#[derive(Default)]
struct FakeAnalyzer {
    fail_on: Vec<&'static str>,
    calls: RefCell<Vec<PathBuf>>,
}

impl FakeAnalyzer {
    fn failing_on(names: &[&'static str]) -> Self {
        Self {
            fail_on: names.to_vec(),
            ..Default::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Analyzer for FakeAnalyzer {
    fn analyze(&self, req: &AnalyzeRequest<'_>) -> Result<AnalyzeOutput, AnalyzerError> {
        self.calls.borrow_mut().push(req.input.to_path_buf());
        let name = req.input.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_on.iter().any(|f| *f == name) {
            return Err(AnalyzerError::Exit {
                status: "code 2".into(),
                stderr: "decoder exploded\n".into(),
            });
        }
        fs::write(
            req.output,
            format!("delay={} skip={}", req.delay_seconds, req.frame_skip),
        )
        .map_err(|e| AnalyzerError::Io(e.to_string()))?;
        Ok(AnalyzeOutput::default())
    }
}

fn videos(root: &Path, names: &[&str]) {
    for n in names {
        fs::write(root.join(n), b"not really a video").unwrap();
    }
}

fn completed(outcome: BatchOutcome) -> BatchRun {
    match outcome {
        BatchOutcome::Completed(run) => run,
        other => panic!("expected a completed batch, got {other:?}"),
    }
}

fn assert_summary_invariant(s: &Summary, len: usize) {
    assert_eq!(s.successful + s.skipped + s.errors, s.total_files);
    assert_eq!(s.total_files, len);
}

#[test]
fn scenario_a_all_succeed() {
    let tmp = TempDir::new().unwrap();
    videos(tmp.path(), &["one.mp4", "two.mp4", "three.MP4"]);
    let fake = FakeAnalyzer::default();

    let run = completed(JobRunner::new(&RunOptions::default(), &fake).run_batch(tmp.path()));

    assert_eq!(run.results.len(), 3);
    assert!(run.results.iter().all(|r| r.is_success()));
    assert_eq!(fake.call_count(), 3);
    assert!(run.average_duration.is_some());

    let summary = Summary::from_results(&run.results, run.total_duration);
    assert_eq!((summary.successful, summary.skipped, summary.errors), (3, 0, 0));
    assert_summary_invariant(&summary, run.results.len());

    assert!(tmp.path().join("three_analysis.txt").exists());
    assert_eq!(
        fs::read_to_string(tmp.path().join("one_analysis.txt")).unwrap(),
        "delay=0 skip=30"
    );
}

#[test]
fn scenario_b_existing_output_is_skipped() {
    let tmp = TempDir::new().unwrap();
    videos(tmp.path(), &["seen.mp4"]);
    fs::write(tmp.path().join("seen_analysis.txt"), "previous run").unwrap();
    let fake = FakeAnalyzer::default();

    let run = completed(JobRunner::new(&RunOptions::default(), &fake).run_batch(tmp.path()));

    assert_eq!(fake.call_count(), 0);
    assert_eq!(run.results.len(), 1);
    match &run.results[0].outcome {
        JobOutcome::Skipped { reason, output_path } => {
            assert_eq!(reason, SKIP_REASON);
            assert!(output_path.ends_with("seen_analysis.txt"));
        }
        other => panic!("expected skipped, got {other:?}"),
    }
    assert_eq!(run.average_duration, None);
}

#[test]
fn scenario_c_one_failure_does_not_stop_the_batch() {
    let tmp = TempDir::new().unwrap();
    videos(tmp.path(), &["a.mp4", "b.mp4", "c.mp4"]);
    fs::write(tmp.path().join("c_analysis.txt"), "done").unwrap();
    let fake = FakeAnalyzer::failing_on(&["b.mp4"]);
    let opts = RunOptions::default();

    let run = completed(JobRunner::new(&opts, &fake).run_batch(tmp.path()));

    let files: Vec<&str> = run.results.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, vec!["a.mp4", "b.mp4", "c.mp4"]);
    assert!(run.results[0].is_success());
    assert!(run.results[2].is_skipped());
    match &run.results[1].outcome {
        JobOutcome::Error { error, stderr, output_path } => {
            assert!(error.contains("code 2"));
            assert_eq!(stderr.as_deref(), Some("decoder exploded"));
            assert!(output_path.ends_with("b_analysis.txt"));
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(run.errors().count(), 1);

    let report = BatchReport::new(tmp.path(), &opts, &run.results, run.total_duration);
    assert_summary_invariant(&report.summary, 3);
    let path = ReportWriter::default().write(tmp.path(), &report).unwrap();
    assert!(path.starts_with(tmp.path()));
    assert!(path.exists());
}

#[test]
fn second_run_skips_everything() {
    let tmp = TempDir::new().unwrap();
    videos(tmp.path(), &["x.mp4", "y.mp4"]);
    let opts = RunOptions::default();

    let first = FakeAnalyzer::default();
    completed(JobRunner::new(&opts, &first).run_batch(tmp.path()));
    assert_eq!(first.call_count(), 2);

    let second = FakeAnalyzer::default();
    let run = completed(JobRunner::new(&opts, &second).run_batch(tmp.path()));
    assert_eq!(second.call_count(), 0);
    assert!(run.results.iter().all(|r| r.is_skipped()));
}

#[test]
fn force_reprocesses_existing_outputs() {
    let tmp = TempDir::new().unwrap();
    videos(tmp.path(), &["x.mp4"]);
    fs::write(tmp.path().join("x_analysis.txt"), "stale").unwrap();
    let opts = RunOptions {
        force: true,
        delay: 0.25,
        frame_skip: 5,
        ..RunOptions::default()
    };
    let fake = FakeAnalyzer::default();

    let run = completed(JobRunner::new(&opts, &fake).run_batch(tmp.path()));
    assert_eq!(fake.call_count(), 1);
    assert!(run.results[0].is_success());
    assert_eq!(
        fs::read_to_string(tmp.path().join("x_analysis.txt")).unwrap(),
        "delay=0.25 skip=5"
    );
}

#[test]
fn one_result_per_discovered_file_in_nested_tree() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("day1/cam")).unwrap();
    videos(tmp.path(), &["root.mp4", "day1/a.mp4", "day1/cam/b.mp4", "day1/cam/c.mov"]);
    let fake = FakeAnalyzer::failing_on(&["a.mp4"]);

    let run = completed(JobRunner::new(&RunOptions::default(), &fake).run_batch(tmp.path()));

    let files: Vec<&str> = run.results.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, vec!["day1/a.mp4", "day1/cam/b.mp4", "root.mp4"]);
    assert_eq!(fake.call_count(), 3);
    assert!(tmp.path().join("day1/cam/b_analysis.txt").exists());
}

#[test]
fn empty_directory_is_nothing_to_do() {
    let tmp = TempDir::new().unwrap();
    videos(tmp.path(), &["readme.txt"]);
    let fake = FakeAnalyzer::default();

    let outcome = JobRunner::new(&RunOptions::default(), &fake).run_batch(tmp.path());
    assert!(matches!(outcome, BatchOutcome::NothingToDo));
    assert_eq!(fake.call_count(), 0);
}
