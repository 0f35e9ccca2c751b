use super::{AnalyzeOutput, AnalyzeRequest, Analyzer, AnalyzerError};
use crate::config::Config;
use crate::interrupt;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs the analyzer as a child process, one invocation per file.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    capture_limit: usize,
    timeout: Option<Duration>,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
            capture_limit: 10 * 1024 * 1024,
            timeout: None,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let timeout = if cfg.analyzer.timeout_seconds > 0 {
            Some(Duration::from_secs(cfg.analyzer.timeout_seconds))
        } else {
            None
        };
        Self {
            program: cfg.analyzer.program.clone(),
            args: cfg.analyzer.args.clone(),
            env: cfg.analyzer.env.clone(),
            capture_limit: cfg.analyzer.capture_limit_bytes,
            timeout,
        }
    }

    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The argument vector for `req`, with placeholders filled in.
    pub fn command_args(&self, req: &AnalyzeRequest<'_>) -> Vec<OsString> {
        self.args.iter().map(|a| expand_arg(a, req)).collect()
    }
}

const PLACEHOLDERS: [&str; 4] = ["{input}", "{output}", "{delay}", "{frame_skip}"];

/// Single left-to-right pass: substituted values are never rescanned, so a
/// path containing `{output}` stays literal. Paths are pushed as raw `OsStr`.
fn expand_arg(template: &str, req: &AnalyzeRequest<'_>) -> OsString {
    let mut out = OsString::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push(&rest[..open]);
        rest = &rest[open..];
        match PLACEHOLDERS.iter().find(|p| rest.starts_with(**p)) {
            Some(&name) => {
                match name {
                    "{input}" => out.push(req.input),
                    "{output}" => out.push(req.output),
                    "{delay}" => out.push(req.delay_seconds.to_string()),
                    _ => out.push(req.frame_skip.to_string()),
                }
                rest = &rest[name.len()..];
            }
            None => {
                out.push("{");
                rest = &rest[1..];
            }
        }
    }
    out.push(rest);
    out
}

impl Analyzer for CommandAnalyzer {
    fn analyze(&self, req: &AnalyzeRequest<'_>) -> Result<AnalyzeOutput, AnalyzerError> {
        let args = self.command_args(req);
        debug!(program = %self.program, ?args, "spawning analyzer");

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        // Own process group, so a kill reaches whatever the analyzer spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| AnalyzerError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let captured = wait_bounded(&mut child, self.capture_limit, self.timeout)?;
        let stdout = String::from_utf8_lossy(&captured.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&captured.stderr).into_owned();

        match captured.ending {
            Ending::Overflow => Err(AnalyzerError::CaptureOverflow {
                limit: self.capture_limit,
                stderr,
            }),
            Ending::TimedOut(after) => Err(AnalyzerError::Timeout(after, stderr)),
            Ending::Interrupted => Err(AnalyzerError::Interrupted),
            Ending::Exited(status) if !status.success() => Err(AnalyzerError::Exit {
                status: describe_status(status),
                stderr,
            }),
            Ending::Exited(_) => {
                if !stdout.trim().is_empty() {
                    debug!("analyzer stdout: {}", stdout.trim());
                }
                Ok(AnalyzeOutput { stdout, stderr })
            }
        }
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

enum Ending {
    Exited(ExitStatus),
    Overflow,
    TimedOut(Duration),
    Interrupted,
}

struct Captured {
    ending: Ending,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// How long reader threads get to see EOF once the analyzer is gone.
const READER_GRACE: Duration = Duration::from_secs(2);
const POLL: Duration = Duration::from_millis(50);

type Reader = JoinHandle<io::Result<Vec<u8>>>;

fn wait_bounded(
    child: &mut Child,
    limit: usize,
    timeout: Option<Duration>,
) -> Result<Captured, AnalyzerError> {
    // Both pipes are drained concurrently so a chatty analyzer can't block on
    // a full pipe while we wait for it to exit.
    let overflow = Arc::new(AtomicBool::new(false));
    let stdout_thread = spawn_reader(child.stdout.take(), limit, Arc::clone(&overflow));
    let stderr_thread = spawn_reader(child.stderr.take(), limit, Arc::clone(&overflow));
    let pid = child.id();

    let start = Instant::now();
    let ending = loop {
        if let Some(status) = child.try_wait().map_err(|e| AnalyzerError::Io(e.to_string()))? {
            break Ending::Exited(status);
        }
        if overflow.load(Ordering::SeqCst) {
            warn!("analyzer output exceeded {limit} bytes; killing it");
            kill_and_reap(child)?;
            break Ending::Overflow;
        }
        if let Some(t) = timeout {
            if start.elapsed() > t {
                warn!("analyzer timed out after {:?}; killing it", t);
                kill_and_reap(child)?;
                break Ending::TimedOut(t);
            }
        }
        if interrupt::requested() {
            warn!("interrupted; killing analyzer");
            kill_and_reap(child)?;
            break Ending::Interrupted;
        }
        thread::sleep(POLL);
    };

    // A descendant that outlived the analyzer can hold the pipes open forever.
    if !readers_finished(&stdout_thread, &stderr_thread, READER_GRACE) {
        debug!(pid, "analyzer pipes still open after exit; killing its process group");
        kill_group(pid);
        if !readers_finished(&stdout_thread, &stderr_thread, READER_GRACE) {
            warn!(pid, "analyzer output pipes never closed; discarding captured output");
            return Ok(Captured {
                ending,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }
    }

    let stdout = join_reader(stdout_thread, "stdout")?;
    let stderr = join_reader(stderr_thread, "stderr")?;

    let ending = match ending {
        Ending::Exited(_) if overflow.load(Ordering::SeqCst) => Ending::Overflow,
        other => other,
    };
    Ok(Captured {
        ending,
        stdout,
        stderr,
    })
}

fn readers_finished(a: &Reader, b: &Reader, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if a.is_finished() && b.is_finished() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// SIGKILL to the analyzer's whole process group (its pgid is its pid).
#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // ESRCH just means the group is already gone.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

fn kill_and_reap(child: &mut Child) -> Result<(), AnalyzerError> {
    // The child is not reaped yet, so its pid still names the group.
    kill_group(child.id());
    let _ = child.kill();
    child
        .wait()
        .map(|_| ())
        .map_err(|e| AnalyzerError::Io(format!("wait after kill: {e}")))
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
    limit: usize,
    overflow: Arc<AtomicBool>,
) -> Reader {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.by_ref().take(limit as u64 + 1).read_to_end(&mut buf)?;
            if buf.len() > limit {
                // Stop reading; dropping the pipe makes further writes fail.
                buf.truncate(limit);
                overflow.store(true, Ordering::SeqCst);
            }
        }
        Ok(buf)
    })
}

fn join_reader(handle: Reader, stream: &str) -> Result<Vec<u8>, AnalyzerError> {
    handle
        .join()
        .map_err(|_| AnalyzerError::Io(format!("{stream} reader thread panicked")))?
        .map_err(|e| AnalyzerError::Io(format!("read {stream}: {e}")))
}
