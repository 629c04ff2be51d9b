//! Progress notifications for a running pipeline.
//!
//! The engine only talks to the [`Display`] trait; it never depends on output
//! actually being rendered. [`TerminalDisplay`] draws one line per step and,
//! outside verbose mode, redraws the running line every second from a
//! background ticker owned by a [`StepTicker`].

use std::io::{self, Write};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::warn;

/// Width of the model/executor column.
pub const LABEL_WIDTH: usize = 30;
const RULE_WIDTH: usize = 76;
const TICK: Duration = Duration::from_secs(1);

static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]|[\x00-\x1f\x7f]").expect("valid control regex")
});

/// A completed step, as reported to [`Display::step_done`].
#[derive(Debug, Clone)]
pub struct StepReport<'a> {
    pub name: &'a str,
    pub label: &'a str,
    /// Output filename, or elapsed seconds when the step wrote none.
    pub detail: &'a str,
    pub cost: f64,
    pub duration: Duration,
    pub preview: Option<&'a str>,
}

/// Notification sink for engine progress.
pub trait Display {
    fn header(&self, title: &str);
    /// Announce a step. The returned ticker must be stopped before the
    /// step's final line is printed.
    fn step_start(&self, name: &str, label: &str) -> StepTicker;
    fn step_done(&self, report: &StepReport<'_>);
    fn step_failed(&self, name: &str, label: &str, error: &str);
    fn summary(&self, total_cost: f64, total: Duration);
    fn failed(&self, error: &str);
}

/// Handle to a background redraw thread.
///
/// [`StepTicker::stop`] signals the thread and waits for it to exit; dropping
/// the handle does the same, so the thread never outlives the step.
#[derive(Debug, Default)]
pub struct StepTicker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StepTicker {
    /// A ticker with no background thread.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Call `redraw` with the elapsed time once per `interval` until stopped.
    pub fn spawn<F>(interval: Duration, mut redraw: F) -> Self
    where
        F: FnMut(Duration) + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => redraw(started.elapsed()),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        });
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("display ticker thread panicked");
        }
    }
}

impl Drop for StepTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Strip escape sequences and control characters, then fit the label column.
pub fn fit_label(label: &str) -> String {
    let clean = CONTROL_RE.replace_all(label, "");
    if clean.chars().count() <= LABEL_WIDTH {
        return clean.into_owned();
    }
    let mut out: String = clean.chars().take(LABEL_WIDTH - 1).collect();
    out.push('…');
    out
}

fn format_cost(cost: f64) -> String {
    if cost > 0.0 {
        format!("${cost:.4}")
    } else {
        "—".to_string()
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Column-aligned terminal output.
pub struct TerminalDisplay {
    verbose: bool,
    out: SharedWriter,
}

impl TerminalDisplay {
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(verbose, Box::new(io::stdout()))
    }

    pub fn with_writer(verbose: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            verbose,
            out: Arc::new(Mutex::new(out)),
        }
    }

    fn emit(&self, text: &str) {
        write_to(&self.out, text);
    }

    fn line_prefix(&self) -> &'static str {
        if self.verbose { "" } else { "\r" }
    }
}

fn write_to(out: &SharedWriter, text: &str) {
    // Output is cosmetic; a closed terminal must not fail the run.
    if let Ok(mut out) = out.lock() {
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl Display for TerminalDisplay {
    fn header(&self, title: &str) {
        self.emit(&format!("\n🔁 relay — {title}\n{}\n", "─".repeat(RULE_WIDTH)));
    }

    fn step_start(&self, name: &str, label: &str) -> StepTicker {
        let label = fit_label(label);
        let line = format!("⏳ {name:<12} {label:<LABEL_WIDTH$} running...");
        if self.verbose {
            self.emit(&format!("{line}\n"));
            return StepTicker::idle();
        }
        self.emit(&line);
        let out = Arc::clone(&self.out);
        StepTicker::spawn(TICK, move |elapsed| {
            write_to(&out, &format!("\r{line} {:.0}s", elapsed.as_secs_f64()));
        })
    }

    fn step_done(&self, report: &StepReport<'_>) {
        let label = fit_label(report.label);
        let mut text = format!(
            "{}✅ {:<12} {label:<LABEL_WIDTH$} {:<28} {:<10} {:.1}s\n",
            self.line_prefix(),
            report.name,
            report.detail,
            format_cost(report.cost),
            report.duration.as_secs_f64(),
        );
        if let Some(preview) = report.preview.filter(|p| !p.is_empty()) {
            text.push_str(&format!("   └ {preview}\n"));
        }
        self.emit(&text);
    }

    fn step_failed(&self, name: &str, label: &str, error: &str) {
        let label = fit_label(label);
        self.emit(&format!(
            "{}❌ {name:<12} {label:<LABEL_WIDTH$} {error}\n",
            self.line_prefix()
        ));
    }

    fn summary(&self, total_cost: f64, total: Duration) {
        self.emit(&format!(
            "{}\n✅ Done  ${total_cost:.4}  {:.0}s\n\n",
            "─".repeat(RULE_WIDTH),
            total.as_secs_f64()
        ));
    }

    fn failed(&self, error: &str) {
        self.emit(&format!("{}\n❌ Failed: {error}\n\n", "─".repeat(RULE_WIDTH)));
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDisplay;

impl Display for NoopDisplay {
    fn header(&self, _title: &str) {}

    fn step_start(&self, _name: &str, _label: &str) -> StepTicker {
        StepTicker::idle()
    }

    fn step_done(&self, _report: &StepReport<'_>) {}

    fn step_failed(&self, _name: &str, _label: &str, _error: &str) {}

    fn summary(&self, _total_cost: f64, _total: Duration) {}

    fn failed(&self, _error: &str) {}
}
