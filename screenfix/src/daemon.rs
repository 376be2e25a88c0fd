// Capture daemon main loop
//
// One capture thread drives the ImageSource and pushes temp image paths over a
// channel. The calling thread owns the annotation window and polls it every
// UI_POLL_INTERVAL. Only one annotation is active; a newer capture replaces it.

use crate::annotation::{AnnotationFlow, AnnotationOutcome, AnnotationUi, AnnotationWindow, PromptResponse};
use crate::capture::{CaptureError, SourceFactory, SourceKind};
use crate::store::config::Config;
use crate::store::screenshots::ScreenshotStore;
use crate::store::state::{StateStore, StateUpdate};
use crate::store::tasks::TaskLog;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const UI_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonPhase {
    Idle,
    Listening,
    ShuttingDown,
    Terminated,
}

struct ActiveAnnotation {
    image: PathBuf,
    window: Box<dyn AnnotationWindow>,
}

/// Running capture thread plus the receiving end of its image channel
pub struct CaptureHandle {
    images: Receiver<PathBuf>,
    thread: JoinHandle<()>,
}

pub struct Daemon {
    state: StateStore,
    flow: AnnotationFlow,
    ui: Box<dyn AnnotationUi>,
    cancel: CancellationToken,
    phase: DaemonPhase,
    active: Option<ActiveAnnotation>,
    source: SourceKind,
    pid: u32,
}

impl Daemon {
    pub fn new(config: &Config, ui: Box<dyn AnnotationUi>, cancel: CancellationToken) -> Self {
        Self {
            state: StateStore::new(&config.paths().state_file),
            flow: AnnotationFlow::new(
                TaskLog::new(config.tasks_file()),
                ScreenshotStore::new(config.save_directory()),
            ),
            ui,
            cancel,
            phase: DaemonPhase::Idle,
            active: None,
            source: SourceKind::default(),
            pid: std::process::id(),
        }
    }

    /// Strategy published in state.json so clients know how captures are taken
    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    pub fn phase(&self) -> DaemonPhase {
        self.phase
    }

    /// Whether an annotation window is currently open
    pub fn has_active_annotation(&self) -> bool {
        self.active.is_some()
    }

    /// Arm capture and serve annotations until the token is cancelled
    pub fn run(&mut self, factory: SourceFactory) -> Result<()> {
        let capture = self.start(factory)?;

        while !self.cancel.is_cancelled() {
            self.tick(&capture);
            thread::sleep(UI_POLL_INTERVAL);
        }

        self.shutdown(capture);
        Ok(())
    }

    /// Idle → Listening once the capture thread has armed its source
    pub fn start(&mut self, factory: SourceFactory) -> Result<CaptureHandle> {
        let (images_tx, images) = mpsc::channel();
        let (armed_tx, armed_rx) = mpsc::channel();
        let cancel = self.cancel.clone();

        let thread = thread::Builder::new()
            .name("screenfix-capture".to_string())
            .spawn(move || capture_loop(factory, images_tx, armed_tx, cancel))
            .context("Failed to spawn capture thread")?;

        match armed_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e).context("Failed to arm capture source");
            }
            Err(_) => {
                let _ = thread.join();
                return Err(anyhow!("Capture thread exited before arming"));
            }
        }

        let update = StateUpdate::listening(true).with_source(self.source.as_str());
        if let Err(e) = self.state.write(self.pid, update) {
            log::warn!("Failed to publish listening state: {:#}", e);
        }
        self.phase = DaemonPhase::Listening;
        log::info!("Listening for screenshots (pid {})", self.pid);

        Ok(CaptureHandle { images, thread })
    }

    /// One UI iteration: take new captures, then poll the open window
    pub fn tick(&mut self, capture: &CaptureHandle) {
        while let Ok(image) = capture.images.try_recv() {
            self.present(image);
        }
        self.poll_active();
    }

    fn present(&mut self, image: PathBuf) {
        if let Some(mut previous) = self.active.take() {
            log::info!(
                "New capture replaces open annotation for {}",
                previous.image.display()
            );
            previous.window.close();
            self.flow.discard(&previous.image);
        }

        match self.ui.open(&image) {
            Ok(window) => {
                log::info!("Annotating {}", image.display());
                self.active = Some(ActiveAnnotation { image, window });
            }
            Err(e) => {
                log::warn!("Failed to open annotation window: {:#}", e);
                self.flow.discard(&image);
            }
        }
    }

    fn poll_active(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let response = match active.window.poll() {
            Ok(Some(response)) => response,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Annotation window failed: {:#}", e);
                PromptResponse::cancel()
            }
        };

        let Some(ActiveAnnotation { image, .. }) = self.active.take() else {
            return;
        };

        match self.flow.finish(&image, response) {
            Ok(AnnotationOutcome::Saved { path, .. }) => {
                let update = StateUpdate::capture(path.to_string_lossy());
                if let Err(e) = self.state.write(self.pid, update) {
                    log::warn!("Failed to record last capture: {:#}", e);
                }
            }
            Ok(AnnotationOutcome::Discarded) => log::info!("Capture cancelled"),
            Err(e) => log::warn!("Failed to save capture {}: {:#}", image.display(), e),
        }
    }

    /// Listening → ShuttingDown → Terminated
    pub fn shutdown(&mut self, capture: CaptureHandle) {
        self.phase = DaemonPhase::ShuttingDown;
        log::info!("Shutting down");
        self.cancel.cancel();

        if let Some(mut active) = self.active.take() {
            active.window.close();
            self.flow.discard(&active.image);
        }

        if capture.thread.join().is_err() {
            log::warn!("Capture thread panicked");
        }
        // Captures that raced the shutdown are never shown
        while let Ok(image) = capture.images.try_recv() {
            self.flow.discard(&image);
        }

        if let Err(e) = self.state.clear() {
            log::warn!(
                "Failed to remove state file {}: {}",
                self.state.path().display(),
                e
            );
        }
        self.phase = DaemonPhase::Terminated;
    }
}

fn capture_loop(
    factory: SourceFactory,
    images: Sender<PathBuf>,
    armed: Sender<Result<(), CaptureError>>,
    cancel: CancellationToken,
) {
    let mut source = match factory() {
        Ok(source) => {
            let _ = armed.send(Ok(()));
            source
        }
        Err(e) => {
            let _ = armed.send(Err(e));
            return;
        }
    };

    while !cancel.is_cancelled() {
        match source.poll_or_wait() {
            Ok(Some(path)) => {
                if images.send(path).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Capture failed: {}", e),
        }
    }
}

/// Cancel `token` on SIGINT or SIGTERM
#[cfg(unix)]
pub fn cancel_on_signals(token: CancellationToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register shutdown signals")?;

    thread::Builder::new()
        .name("screenfix-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                log::info!("Received signal {}", signal);
                token.cancel();
            }
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}
