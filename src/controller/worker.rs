//! Serial job queue shared by a controller and its device callbacks.
//!
//! Every device interaction runs as a job on one tokio task, in submission
//! order. Delayed work goes through [`Timer`], which re-enters the queue when
//! it fires.

use crate::error::CameraError;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

type Job<C> = Box<dyn FnOnce(&mut C) -> Result<(), CameraError> + Send>;

enum Message<C> {
    Run {
        name: &'static str,
        ensure_available: bool,
        job: Job<C>,
        done: oneshot::Sender<()>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// State owned by the worker task
pub(crate) trait WorkerCore: Send + 'static {
    /// Whether a device is open
    fn is_available(&self) -> bool;

    /// A job returned an error
    fn on_job_failed(&mut self, name: &'static str, error: CameraError);

    /// Release everything before the worker exits
    fn shutdown(&mut self);
}

/// Completion handle of a scheduled job.
///
/// Resolves once the job ran, was skipped, or the worker went away.
#[derive(Debug)]
pub struct TaskHandle {
    done: Option<oneshot::Receiver<()>>,
}

impl TaskHandle {
    /// A handle for work that finished synchronously
    pub fn completed() -> Self {
        Self { done: None }
    }

    pub async fn wait(self) {
        if let Some(done) = self.done {
            let _ = done.await;
        }
    }
}

/// Sending side of the job queue
pub(crate) struct Scheduler<C> {
    sender: mpsc::UnboundedSender<Message<C>>,
}

impl<C> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Receiving side, consumed by [`spawn_worker`]
pub(crate) struct Inbox<C> {
    receiver: mpsc::UnboundedReceiver<Message<C>>,
}

impl<C: WorkerCore> Scheduler<C> {
    pub fn channel() -> (Self, Inbox<C>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, Inbox { receiver })
    }

    /// Queue `job`; with `ensure_available` it is skipped while no device is open
    pub fn schedule<F>(&self, name: &'static str, ensure_available: bool, job: F) -> TaskHandle
    where
        F: FnOnce(&mut C) -> Result<(), CameraError> + Send + 'static,
    {
        let (done, receiver) = oneshot::channel();
        let message = Message::Run {
            name,
            ensure_available,
            job: Box::new(job),
            done,
        };
        if self.sender.send(message).is_err() {
            debug!("Worker is gone, dropping job '{}'", name);
            return TaskHandle::completed();
        }
        TaskHandle {
            done: Some(receiver),
        }
    }

    /// Ask the worker to release its state and exit
    pub fn shutdown(&self) -> TaskHandle {
        let (done, receiver) = oneshot::channel();
        if self.sender.send(Message::Shutdown { done }).is_err() {
            return TaskHandle::completed();
        }
        TaskHandle {
            done: Some(receiver),
        }
    }
}

/// Run `core` on its own task until shutdown or until every scheduler is dropped
pub(crate) fn spawn_worker<C: WorkerCore>(mut core: C, inbox: Inbox<C>) -> JoinHandle<()> {
    let mut receiver = inbox.receiver;
    tokio::spawn(async move {
        debug!("Camera worker started");
        while let Some(message) = receiver.recv().await {
            match message {
                Message::Run {
                    name,
                    ensure_available,
                    job,
                    done,
                } => {
                    if ensure_available && !core.is_available() {
                        trace!("Skipping '{}', camera not available", name);
                    } else {
                        trace!("Running '{}'", name);
                        if let Err(e) = job(&mut core) {
                            error!("Job '{}' failed: {}", name, e);
                            core.on_job_failed(name, e);
                        }
                    }
                    let _ = done.send(());
                }
                Message::Shutdown { done } => {
                    core.shutdown();
                    let _ = done.send(());
                    break;
                }
            }
        }
        debug!("Camera worker stopped");
    })
}

/// A single pending delayed job; arming again replaces the previous one
#[derive(Debug, Default)]
pub(crate) struct Timer {
    token: Option<CancellationToken>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm<C, F>(&mut self, scheduler: &Scheduler<C>, delay: Duration, name: &'static str, job: F)
    where
        C: WorkerCore,
        F: FnOnce(&mut C) -> Result<(), CameraError> + Send + 'static,
    {
        self.cancel();
        let token = CancellationToken::new();
        let fired = token.clone();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = fired.cancelled() => {
                    trace!("Timer '{}' cancelled", name);
                }
                _ = tokio::time::sleep(delay) => {
                    // Cancellation can still land while the job waits in the queue.
                    scheduler.schedule(name, true, move |core| {
                        if fired.is_cancelled() {
                            return Ok(());
                        }
                        job(core)
                    });
                }
            }
        });
        self.token = Some(token);
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.token.as_ref().is_some_and(|token| !token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationSetting;

    #[derive(Default)]
    struct Recording {
        available: bool,
        ran: Vec<&'static str>,
        failures: Vec<CameraError>,
        shut_down: bool,
    }

    struct Core(std::sync::Arc<parking_lot::Mutex<Recording>>);

    impl WorkerCore for Core {
        fn is_available(&self) -> bool {
            self.0.lock().available
        }

        fn on_job_failed(&mut self, _name: &'static str, error: CameraError) {
            self.0.lock().failures.push(error);
        }

        fn shutdown(&mut self) {
            self.0.lock().shut_down = true;
        }
    }

    fn start() -> (Scheduler<Core>, std::sync::Arc<parking_lot::Mutex<Recording>>) {
        let recording = std::sync::Arc::new(parking_lot::Mutex::new(Recording::default()));
        let (scheduler, inbox) = Scheduler::channel();
        spawn_worker(Core(std::sync::Arc::clone(&recording)), inbox);
        (scheduler, recording)
    }

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let (scheduler, recording) = start();
        scheduler.schedule("first", false, |core| {
            core.0.lock().ran.push("first");
            Ok(())
        });
        scheduler
            .schedule("second", false, |core| {
                core.0.lock().ran.push("second");
                Ok(())
            })
            .wait()
            .await;
        assert_eq!(recording.lock().ran, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unavailable_jobs_are_skipped_but_resolve() {
        let (scheduler, recording) = start();
        scheduler
            .schedule("guarded", true, |core| {
                core.0.lock().ran.push("guarded");
                Ok(())
            })
            .wait()
            .await;
        assert!(recording.lock().ran.is_empty());

        recording.lock().available = true;
        scheduler
            .schedule("guarded", true, |core| {
                core.0.lock().ran.push("guarded");
                Ok(())
            })
            .wait()
            .await;
        assert_eq!(recording.lock().ran, vec!["guarded"]);
    }

    #[tokio::test]
    async fn test_failures_reach_the_core() {
        let (scheduler, recording) = start();
        scheduler
            .schedule("failing", false, |_| {
                Err(CameraError::configuration(ConfigurationSetting::Flash, "nope"))
            })
            .wait()
            .await;
        assert_eq!(recording.lock().failures.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_worker() {
        let (scheduler, recording) = start();
        scheduler.shutdown().wait().await;
        assert!(recording.lock().shut_down);

        // A job after shutdown never runs, but its handle still resolves.
        scheduler
            .schedule("late", false, |core| {
                core.0.lock().ran.push("late");
                Ok(())
            })
            .wait()
            .await;
        assert!(recording.lock().ran.is_empty());
    }

    #[tokio::test]
    async fn test_timer_fires_and_cancels() {
        let (scheduler, recording) = start();
        recording.lock().available = true;

        let mut timer = Timer::new();
        timer.arm(&scheduler, Duration::from_millis(10), "tick", |core: &mut Core| {
            core.0.lock().ran.push("tick");
            Ok(())
        });
        assert!(timer.is_armed());
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.schedule("flush", false, |_| Ok(())).wait().await;
        assert_eq!(recording.lock().ran, vec!["tick"]);

        timer.arm(&scheduler, Duration::from_millis(10), "tock", |core: &mut Core| {
            core.0.lock().ran.push("tock");
            Ok(())
        });
        timer.cancel();
        assert!(!timer.is_armed());
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.schedule("flush", false, |_| Ok(())).wait().await;
        assert_eq!(recording.lock().ran, vec!["tick"]);
    }
}
