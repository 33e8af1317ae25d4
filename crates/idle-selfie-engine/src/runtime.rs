use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use idle_selfie_contracts::settings::IdleSettings;
use idle_selfie_contracts::settings_store::SettingsStore;

use crate::activity::ActivitySignal;
use crate::controller::IdleController;
use crate::image::{GeneratedImage, ImageGenerator};
use crate::interceptor::ImageJob;

const LOOP_THREAD_NAME: &str = "idle-selfie-loop";

/// Inputs to the event loop.
#[derive(Debug)]
pub enum Signal {
    Activity(ActivitySignal),
    TranscriptChanged,
    SettingsChanged(IdleSettings),
    Toggle,
    ImageReady {
        cycle: u64,
        image: Option<GeneratedImage>,
    },
    Shutdown,
}

/// Cloneable sender side of a running loop. Sends after shutdown are no-ops.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    sender: mpsc::Sender<Signal>,
}

impl RuntimeHandle {
    pub fn send(&self, signal: Signal) -> bool {
        self.sender.send(signal).is_ok()
    }

    pub fn activity(&self, signal: ActivitySignal) -> bool {
        self.send(Signal::Activity(signal))
    }

    pub fn transcript_changed(&self) -> bool {
        self.send(Signal::TranscriptChanged)
    }

    pub fn toggle(&self) -> bool {
        self.send(Signal::Toggle)
    }

    pub fn apply_settings(&self, settings: IdleSettings) -> bool {
        self.send(Signal::SettingsChanged(settings))
    }
}

/// Owns the thread that drives an [`IdleController`].
///
/// The loop sleeps until the controller's next wake instant or the next
/// signal, whichever comes first. Image requests run on their own threads and
/// report back through the same channel.
pub struct IdleRuntime {
    handle: RuntimeHandle,
    thread: Option<thread::JoinHandle<IdleController>>,
}

impl IdleRuntime {
    pub fn start(
        mut controller: IdleController,
        generator: Arc<dyn ImageGenerator>,
        store: Option<SettingsStore>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        controller.activate(Instant::now());
        let worker = LoopWorker {
            controller,
            generator,
            store,
            sender: tx.clone(),
        };
        let thread = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_string())
            .spawn(move || worker.run(rx))
            .context("failed to spawn idle loop thread")?;
        Ok(Self {
            handle: RuntimeHandle { sender: tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Stops the loop and hands back the controller. `None` when the loop
    /// already stopped or panicked.
    pub fn stop(&mut self) -> Option<IdleController> {
        let thread = self.thread.take()?;
        let _ = self.handle.sender.send(Signal::Shutdown);
        match thread.join() {
            Ok(controller) => Some(controller),
            Err(_) => {
                tracing::warn!("idle loop thread panicked");
                None
            }
        }
    }
}

impl Drop for IdleRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopWorker {
    controller: IdleController,
    generator: Arc<dyn ImageGenerator>,
    store: Option<SettingsStore>,
    sender: mpsc::Sender<Signal>,
}

impl LoopWorker {
    fn run(mut self, rx: mpsc::Receiver<Signal>) -> IdleController {
        loop {
            let signal = match self.controller.next_wake() {
                Some(wake) => {
                    match rx.recv_timeout(wake.saturating_duration_since(Instant::now())) {
                        Ok(signal) => Some(signal),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => break,
                },
            };
            let now = Instant::now();
            match signal {
                None => {}
                Some(Signal::Shutdown) => break,
                Some(Signal::Activity(activity)) => self.controller.on_activity(activity, now),
                Some(Signal::TranscriptChanged) => {
                    if let Some(job) = self.controller.on_transcript_changed(now) {
                        self.spawn_image_job(job);
                    }
                }
                Some(Signal::SettingsChanged(settings)) => {
                    self.controller.apply_settings(settings, now)
                }
                Some(Signal::Toggle) => {
                    self.controller.toggle(now);
                    self.persist_enabled();
                }
                Some(Signal::ImageReady { cycle, image }) => {
                    self.controller.complete_capture(cycle, image);
                }
            }
            self.controller.tick(now);
        }
        tracing::debug!("idle loop stopped");
        self.controller
    }

    fn spawn_image_job(&self, job: ImageJob) {
        let generator = Arc::clone(&self.generator);
        let sender = self.sender.clone();
        let cycle = job.cycle;
        let spawned = thread::Builder::new()
            .name(format!("idle-selfie-image-{cycle}"))
            .spawn(move || {
                let image = generator.generate(&job.request);
                let _ = sender.send(Signal::ImageReady { cycle, image });
            });
        if let Err(err) = spawned {
            tracing::warn!(cycle, "image worker spawn failed: {err}");
            let _ = self.sender.send(Signal::ImageReady { cycle, image: None });
        }
    }

    fn persist_enabled(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let enabled = self.controller.settings().enabled;
        if let Err(err) = store.update(|settings| {
            settings.enabled = enabled;
            Ok(())
        }) {
            tracing::warn!("failed to persist idle toggle: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use idle_selfie_contracts::events::EventWriter;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::image::ImageRequest;
    use crate::testing::RecordingHost;

    struct FixedImage;

    impl ImageGenerator for FixedImage {
        fn generate(&self, request: &ImageRequest) -> Option<GeneratedImage> {
            Some(GeneratedImage::new(
                request.caption.as_bytes().to_vec(),
                Some("image/webp".to_string()),
            ))
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn toggle_is_applied_and_persisted() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SettingsStore::new(temp.path().join("settings.json"));
        store.save(&IdleSettings::default())?;
        let host = Arc::new(RecordingHost::new("Mira"));
        let controller = IdleController::new(
            IdleSettings::default(),
            host.clone(),
            EventWriter::disabled("test"),
        );

        let mut runtime =
            IdleRuntime::start(controller, Arc::new(FixedImage), Some(store.clone()))?;
        assert!(runtime.handle().toggle());
        assert!(wait_until(|| !host.notices().is_empty()));
        let controller = runtime.stop().expect("controller");

        assert!(controller.settings().enabled);
        assert!(controller.deadline().is_some());
        assert!(store.load()?.enabled);
        assert!(!runtime.handle().toggle());
        Ok(())
    }

    #[test]
    fn claimed_reply_gets_its_image() -> anyhow::Result<()> {
        let host = Arc::new(RecordingHost::new("Mira"));
        let settings = IdleSettings {
            enabled: true,
            selfie_image_enabled: true,
            ..IdleSettings::default()
        };
        let mut controller = IdleController::with_rng(
            settings,
            host.clone(),
            EventWriter::disabled("test"),
            StdRng::seed_from_u64(5),
        );
        let start = Instant::now();
        controller.activate(start);
        controller.tick(start + Duration::from_secs(120));
        assert!(controller.session().waiting_for_reply());

        let mut runtime = IdleRuntime::start(controller, Arc::new(FixedImage), None)?;
        host.push_message(Some("Mira"), Some("Sunlit cafe corner."));
        runtime.handle().transcript_changed();

        assert!(wait_until(|| !host.published().is_empty()));
        let (name, body) = host.published().remove(0);
        assert_eq!(name, "Mira");
        assert_eq!(body.caption, "Sunlit cafe corner.");
        assert_eq!(
            body.image.map(|image| image.mime_type),
            Some("image/webp".to_string())
        );
        runtime.stop();
        Ok(())
    }
}
