//! Volume notification overlay.
//!
//! A single on-screen indicator owned by a dedicated thread. Callers on any
//! thread enqueue commands; the actor applies them in order, updates the
//! indicator in place while it is visible and dismisses it once no update
//! has arrived for the notification duration.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upper bound on how long the actor sleeps between window message pumps.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Overlay error types.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("Failed to spawn overlay thread: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[cfg(windows)]
    #[error("Overlay window error: {0}")]
    Window(#[source] windows::core::Error),

    #[error("Overlay thread exited during startup")]
    ThreadExited,
}

/// Presentation of the indicator. Lives on the overlay thread only.
pub trait OverlaySurface {
    /// Display `level`, creating the indicator if absent or updating it in
    /// place otherwise.
    fn show(&mut self, level: u8) -> Result<(), OverlayError>;

    /// Remove the indicator. No-op when nothing is shown.
    fn hide(&mut self);

    /// Process pending window messages.
    fn pump(&mut self) {}
}

/// Indicator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Absent,
    Visible { level: u8, dismiss_at: Instant },
}

/// Outcome of [`Indicator::show`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    Created,
    Updated,
}

/// Dismissal state machine, independent of any window.
#[derive(Debug)]
pub struct Indicator {
    state: IndicatorState,
    duration: Duration,
}

impl Indicator {
    pub fn new(duration: Duration) -> Self {
        Self {
            state: IndicatorState::Absent,
            duration,
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    /// Show `level` (clamped to 100) and re-arm the dismissal deadline.
    pub fn show(&mut self, level: u8, now: Instant) -> ShowOutcome {
        let outcome = match self.state {
            IndicatorState::Absent => ShowOutcome::Created,
            IndicatorState::Visible { .. } => ShowOutcome::Updated,
        };
        self.state = IndicatorState::Visible {
            level: level.min(100),
            dismiss_at: now + self.duration,
        };
        outcome
    }

    /// Dismiss if the deadline has passed. Returns whether it was dismissed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.state {
            IndicatorState::Visible { dismiss_at, .. } if now >= dismiss_at => {
                self.state = IndicatorState::Absent;
                true
            }
            _ => false,
        }
    }

    /// Dismiss immediately. Returns whether something was visible.
    pub fn close(&mut self) -> bool {
        let was_visible = matches!(self.state, IndicatorState::Visible { .. });
        self.state = IndicatorState::Absent;
        was_visible
    }

    /// Change the duration. A visible indicator keeps its current deadline;
    /// the new value applies from the next update.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// Time left until dismissal, if visible.
    pub fn time_to_dismiss(&self, now: Instant) -> Option<Duration> {
        match self.state {
            IndicatorState::Visible { dismiss_at, .. } => {
                Some(dismiss_at.saturating_duration_since(now))
            }
            IndicatorState::Absent => None,
        }
    }
}

#[derive(Debug)]
enum OverlayCommand {
    Show(u8),
    SetDuration(Duration),
    Close,
    Shutdown,
}

/// Handle to the overlay thread.
pub struct Overlay {
    commands: Mutex<Option<Sender<OverlayCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Overlay {
    /// Start the overlay thread. `create_surface` runs on that thread; its
    /// failure is returned here.
    pub fn spawn<S, F>(create_surface: F, duration: Duration) -> Result<Self, OverlayError>
    where
        S: OverlaySurface,
        F: FnOnce() -> Result<S, OverlayError> + Send + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("overlay".to_string())
            .spawn(move || match create_surface() {
                Ok(surface) => {
                    let _ = ready_tx.send(Ok(()));
                    run_overlay(surface, commands_rx, duration);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(duration_ms = duration.as_millis() as u64, "overlay started");
                Ok(Self {
                    commands: Mutex::new(Some(commands_tx)),
                    thread: Mutex::new(Some(handle)),
                })
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(OverlayError::ThreadExited)
            }
        }
    }

    /// Show a volume level. Never blocks; levels above 100 display as 100.
    pub fn show_volume_notification(&self, level: u32) {
        let level = level.min(100) as u8;
        self.send(OverlayCommand::Show(level));
    }

    /// Change how long the indicator stays up after the last update.
    pub fn set_duration(&self, duration: Duration) {
        self.send(OverlayCommand::SetDuration(duration));
    }

    /// Dismiss the indicator now.
    pub fn close(&self) {
        self.send(OverlayCommand::Close);
    }

    /// Dismiss the indicator and stop the thread. Idempotent.
    pub fn shutdown(&self) {
        if let Some(commands) = lock(&self.commands).take() {
            let _ = commands.send(OverlayCommand::Shutdown);
        }
        if let Some(handle) = lock(&self.thread).take() {
            if handle.join().is_err() {
                error!("overlay thread panicked");
            }
            info!("overlay stopped");
        }
    }

    fn send(&self, command: OverlayCommand) {
        match lock(&self.commands).as_ref() {
            Some(commands) => {
                if commands.send(command).is_err() {
                    warn!("overlay thread is gone");
                }
            }
            None => debug!(?command, "overlay already shut down"),
        }
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_overlay<S: OverlaySurface>(
    mut surface: S,
    commands: Receiver<OverlayCommand>,
    duration: Duration,
) {
    let mut indicator = Indicator::new(duration);

    loop {
        surface.pump();

        let now = Instant::now();
        if indicator.expire(now) {
            surface.hide();
            debug!("overlay dismissed");
        }

        let wait = indicator
            .time_to_dismiss(now)
            .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));

        match commands.recv_timeout(wait) {
            Ok(OverlayCommand::Show(level)) => {
                let outcome = indicator.show(level, Instant::now());
                debug!(level, ?outcome, "overlay show");
                if let Err(err) = surface.show(level) {
                    warn!(%err, "failed to display overlay");
                    indicator.close();
                    surface.hide();
                }
            }
            Ok(OverlayCommand::SetDuration(duration)) => {
                debug!(duration_ms = duration.as_millis() as u64, "overlay duration changed");
                indicator.set_duration(duration);
            }
            Ok(OverlayCommand::Close) => {
                if indicator.close() {
                    surface.hide();
                }
            }
            Ok(OverlayCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if indicator.close() {
        surface.hide();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
