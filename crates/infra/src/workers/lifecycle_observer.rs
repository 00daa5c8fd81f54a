use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use talentbridge_events::{EventBus, Subscription};
use talentbridge_notifications::WorkerEvent;

/// Handle to stop and join an observer thread.
#[derive(Debug)]
pub struct ObserverHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl ObserverHandle {
    /// Request shutdown and wait for the thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Drains worker lifecycle events on a dedicated thread.
///
/// Observers only look: a slow or failing handler never touches job control
/// flow, it just falls behind on its own subscription.
#[derive(Debug)]
pub struct LifecycleObserver;

impl LifecycleObserver {
    /// Spawn an observer that logs every event.
    pub fn spawn_logging<B>(name: &'static str, bus: B) -> io::Result<ObserverHandle>
    where
        B: EventBus<WorkerEvent> + 'static,
    {
        Self::spawn(name, bus, |event| {
            log_worker_event(&event);
            Ok::<(), std::convert::Infallible>(())
        })
    }

    pub fn spawn<B, H, E>(name: &'static str, bus: B, mut handler: H) -> io::Result<ObserverHandle>
    where
        B: EventBus<WorkerEvent> + 'static,
        H: FnMut(WorkerEvent) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || observer_loop(name, sub, shutdown_rx, &mut handler))?;

        Ok(ObserverHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn observer_loop<H, E>(name: &'static str, sub: Subscription<WorkerEvent>, shutdown_rx: mpsc::Receiver<()>, handler: &mut H)
where
    H: FnMut(WorkerEvent) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(event) => {
                if let Err(err) = handler(event) {
                    warn!(observer = name, error = ?err, "lifecycle observer handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Log one lifecycle event at a level matching its severity.
pub fn log_worker_event(event: &WorkerEvent) {
    match event {
        WorkerEvent::Claimed {
            job_id,
            correlation_id,
            attempt,
        } => debug!(job_id = %job_id, correlation_id = %correlation_id, attempt, "job claimed"),
        WorkerEvent::Completed {
            job_id,
            correlation_id,
            channels,
        } => info!(job_id = %job_id, correlation_id = %correlation_id, channels, "job completed"),
        WorkerEvent::Retrying {
            job_id,
            attempt,
            next_run_at,
            error,
        } => warn!(job_id = %job_id, attempt, next_run_at = %next_run_at, error = %error, "job will retry"),
        WorkerEvent::Failed { job_id, attempts, reason } => {
            error!(job_id = %job_id, attempts, reason = %reason, "job failed")
        }
        WorkerEvent::Error { worker, message } => error!(worker = %worker, message = %message, "worker error"),
    }
}
