//! Progress bookkeeping and ETA estimation for a batch run.
//!
//! [`ProgressTracker`] is plain state owned by the runner loop; rendering is
//! delegated to [`ProgressDisplay`], an `indicatif` bar on stderr. Log lines
//! reach stderr through [`BarAwareStderr`], which clears the live bar around
//! each write.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    current: usize,
    started: Instant,
    durations: Vec<Duration>,
}

/// A point-in-time view of progress, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub eta: Option<Duration>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self::starting_at(total, Instant::now())
    }

    pub fn starting_at(total: usize, started: Instant) -> Self {
        Self {
            total,
            current: 0,
            started,
            durations: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn update(&mut self, current: usize, message: &str) -> ProgressSnapshot {
        self.update_at(current, message, Instant::now())
    }

    /// Records `current` as of `now`. Backward moves are ignored and values
    /// past `total` are clamped, so `current` never decreases.
    pub fn update_at(&mut self, current: usize, message: &str, now: Instant) -> ProgressSnapshot {
        let clamped = current.min(self.total);
        if clamped < self.current {
            debug!(current, recorded = self.current, "ignoring backward progress update");
        } else {
            self.current = clamped;
        }

        ProgressSnapshot {
            current: self.current,
            total: self.total,
            message: message.to_string(),
            eta: self.eta_at(now),
        }
    }

    /// remaining * (elapsed / current); `None` until the first item completes.
    pub fn eta_at(&self, now: Instant) -> Option<Duration> {
        if self.current == 0 {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let per_item = elapsed / self.current as f64;
        let remaining = (self.total - self.current) as f64;
        Some(Duration::from_secs_f64(remaining * per_item))
    }

    pub fn record_completion(&mut self, duration: Duration) {
        self.durations.push(duration);
    }

    pub fn completed_durations(&self) -> &[Duration] {
        &self.durations
    }

    /// Mean duration of the successful items recorded so far.
    pub fn average_duration(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let sum: Duration = self.durations.iter().sum();
        Some(sum / self.durations.len() as u32)
    }
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.current as f64 / self.total as f64
    }

    pub fn label(&self) -> String {
        format!(
            "[{}/{}] {:.1}% {}",
            self.current,
            self.total,
            self.fraction() * 100.0,
            self.message
        )
    }

    pub fn eta_hms(&self) -> Option<String> {
        self.eta.map(format_hms)
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.eta_hms() {
            Some(eta) => write!(f, "{} | ETA {}", self.label(), eta),
            None => f.write_str(&self.label()),
        }
    }
}

/// `HH:MM:SS`, whole seconds; hours are not wrapped.
pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// The bar currently drawn on stderr, if any.
static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

fn active_bar() -> Option<ProgressBar> {
    ACTIVE_BAR.lock().ok().and_then(|slot| slot.clone())
}

fn set_active_bar(bar: Option<ProgressBar>) {
    if let Ok(mut slot) = ACTIVE_BAR.lock() {
        *slot = bar;
    }
}

/// `MakeWriter` for the stderr log layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarAwareStderr;

#[derive(Debug)]
pub struct BarAwareWriter;

impl<'a> MakeWriter<'a> for BarAwareStderr {
    type Writer = BarAwareWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BarAwareWriter
    }
}

impl Write for BarAwareWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match active_bar() {
            Some(bar) => bar.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match active_bar() {
            Some(bar) => bar.suspend(|| io::stderr().write_all(buf)),
            None => io::stderr().write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Terminal rendering of progress snapshots.
pub struct ProgressDisplay {
    bar: ProgressBar,
    registered: bool,
}

impl ProgressDisplay {
    /// Draws to stderr; indicatif hides the bar itself when stderr is not a tty.
    pub fn new(total: usize, enabled: bool) -> Self {
        if !enabled {
            return Self::hidden();
        }
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        set_active_bar(Some(bar.clone()));
        Self {
            bar,
            registered: true,
        }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            registered: false,
        }
    }

    pub fn render(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.current as u64);
        self.bar.set_message(snapshot.to_string());
    }

    pub fn finish(&self) {
        if self.registered {
            set_active_bar(None);
        }
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_formatting() {
        assert_eq!(format_hms(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_hms(Duration::from_secs(3_725)), "01:02:05");
        assert_eq!(format_hms(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn label_shows_fraction() {
        let snap = ProgressSnapshot {
            current: 1,
            total: 4,
            message: "a.mp4".into(),
            eta: None,
        };
        assert_eq!(snap.label(), "[1/4] 25.0% a.mp4");
        assert_eq!(snap.to_string(), "[1/4] 25.0% a.mp4");
    }

    #[test]
    fn log_writer_follows_the_live_bar() {
        let display = ProgressDisplay::new(3, true);
        assert!(active_bar().is_some());
        BarAwareStderr.make_writer().write_all(b"").expect("write while bar is live");

        display.finish();
        assert!(active_bar().is_none());
        BarAwareStderr.make_writer().write_all(b"").expect("write after finish");
    }
}
