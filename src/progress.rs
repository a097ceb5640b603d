use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Bar of the stage currently running, if any. Announcements print above it.
static ACTIVE: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Mutable progress counters of one stage invocation.
#[derive(Debug, Clone)]
pub struct ScanState {
    pub planned: u64,
    pub completed: u64,
    pub errors: u64,
    pub current: Option<String>,
    started: Instant,
}

impl ScanState {
    pub fn new(planned: u64) -> Self {
        Self {
            planned,
            completed: 0,
            errors: 0,
            current: None,
            started: Instant::now(),
        }
    }

    pub fn set_current(&mut self, current: impl Into<String>) {
        self.current = Some(current.into());
    }

    pub fn complete_one(&mut self) {
        self.completed += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            planned: self.planned,
            completed: self.completed,
            errors: self.errors,
            current: self.current.clone(),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Point-in-time copy of a [`ScanState`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub planned: u64,
    pub completed: u64,
    pub errors: u64,
    pub current: Option<String>,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.planned == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.planned as f64 * 100.0).min(100.0)
    }

    /// Completed units per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }
}

impl ProgressSnapshot {
    /// Everything but the percentage: rate, last item and error count.
    pub fn status(&self) -> String {
        let mut out = format!("{:.1}/s", self.rate());
        if let Some(current) = &self.current {
            out.push_str(&format!(" | current: {current}"));
        }
        out.push_str(&format!(" | errors: {}", self.errors));
        out
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% ({}/{}) | {}",
            self.percent(),
            self.completed,
            self.planned,
            self.status()
        )
    }
}

/// Anything that can report a consistent progress snapshot.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn snapshot(&self) -> ProgressSnapshot;
}

/// Background task that samples a [`ProgressSource`] into an `indicatif` bar on a fixed interval.
pub struct ProgressReporter {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(
        label: impl Into<String>,
        source: Arc<dyn ProgressSource>,
        every: Duration,
    ) -> Self {
        let bar = create_progressbar(label.into(), every);
        set_active(Some(bar.clone()));
        let stop = CancellationToken::new();
        let stop_task = stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop_task.cancelled() => break,
                    _ = ticker.tick() => update_bar(&bar, &source.snapshot().await),
                }
            }
            update_bar(&bar, &source.snapshot().await);
            bar.finish();
            set_active(None);
        });
        Self { stop, handle }
    }

    /// Stop sampling, leaving the final state on screen.
    pub async fn finish(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

fn create_progressbar(prefix: String, tick: Duration) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_prefix(prefix);
    bar.set_style(
        ProgressStyle::with_template(
            "[{prefix:.blue}] {elapsed_precise} {bar:36.cyan/blue} {percent:>3}% {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("■■□"),
    );
    bar.enable_steady_tick(tick);
    bar
}

fn update_bar(bar: &ProgressBar, snap: &ProgressSnapshot) {
    bar.set_length(snap.planned);
    bar.set_position(snap.completed.min(snap.planned));
    bar.set_message(snap.status());
}

fn set_active(bar: Option<ProgressBar>) {
    if let Ok(mut active) = ACTIVE.lock() {
        *active = bar;
    }
}

fn active_bar() -> Option<ProgressBar> {
    ACTIVE.lock().ok().and_then(|active| active.clone())
}

/// Print a discovery on its own line above the running bar.
pub fn announce(msg: &str) {
    let line = msg.green().to_string();
    match active_bar() {
        Some(bar) => bar.suspend(|| eprintln!("{line}")),
        None => eprintln!("{line}"),
    }
}
