//! Message pump - the receive/dispatch loop for one subscription.
//!
//! A `MessagePump` owns one receiver and one dispatcher. Once started it runs
//! `max_concurrent_dispatches` worker threads that share the receiver; each
//! worker repeatedly receives a message, dispatches it, and completes it on
//! success or abandons it on failure.
//!
//! Follows the same spawn / stop / collect-stats shape as the other
//! background workers: the owner keeps the handle, `stop()` signals the
//! workers, waits for in-flight dispatches and returns the counters.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver as DoneReceiver, Sender as DoneSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::error::PumpError;
use super::observer::PumpObserver;
use super::status::{PumpStats, PumpStatus};
use crate::bus::{Message, ReceiveError, Receiver};
use crate::dispatch::{panic_reason, DispatchError, Dispatcher};
use crate::naming::Subscription;
use crate::{EventType, PumpConfig, MAX_RECEIVE_TIMEOUT_MS};

/// Per-pump runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpSettings {
    /// Upper bound for one receive call, and so for how long an idle worker
    /// takes to notice a stop request.
    pub receive_timeout: Duration,
    /// Worker threads sharing the receiver.
    pub max_concurrent_dispatches: usize,
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(1),
            max_concurrent_dispatches: 1,
        }
    }
}

impl From<&PumpConfig> for PumpSettings {
    fn from(config: &PumpConfig) -> Self {
        Self {
            receive_timeout: config.receive_timeout(),
            max_concurrent_dispatches: config.max_concurrent_dispatches,
        }
    }
}

/// Receives messages from one subscription and hands them to one dispatcher.
///
/// ## Example
///
/// ```ignore
/// let mut pump = MessagePump::new(subscription, receiver, Box::new(dispatcher), PumpSettings::default());
/// pump.start()?;
///
/// // ... messages are pumped on background threads ...
///
/// let stats = pump.stop();
/// println!("Completed {} messages", stats.messages_completed);
/// ```
pub struct MessagePump {
    shared: Arc<Shared>,
    max_concurrent_dispatches: usize,
    workers: Vec<JoinHandle<()>>,
    done_rx: Option<DoneReceiver<()>>,
}

struct Shared {
    event_type: EventType,
    subscription: Subscription,
    receiver: Box<dyn Receiver>,
    dispatcher: Box<dyn Dispatcher>,
    observer: Arc<dyn PumpObserver>,
    receive_timeout: Duration,
    status: Mutex<PumpStatus>,
    stopping: AtomicBool,
    active_workers: AtomicUsize,
    released: AtomicBool,
    completed: AtomicUsize,
    abandoned: AtomicUsize,
    settle_failures: AtomicUsize,
    polls: AtomicUsize,
}

impl MessagePump {
    /// Build a pump that nobody observes.
    pub fn new(
        subscription: Subscription,
        receiver: Box<dyn Receiver>,
        dispatcher: Box<dyn Dispatcher>,
        settings: PumpSettings,
    ) -> Self {
        Self::observed(subscription, receiver, dispatcher, settings, Arc::new(()))
    }

    /// Build a pump reporting to `observer`.
    pub fn observed(
        subscription: Subscription,
        receiver: Box<dyn Receiver>,
        dispatcher: Box<dyn Dispatcher>,
        settings: PumpSettings,
        observer: Arc<dyn PumpObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                event_type: dispatcher.event_type().clone(),
                subscription,
                receiver,
                dispatcher,
                observer,
                receive_timeout: settings
                    .receive_timeout
                    .min(Duration::from_millis(MAX_RECEIVE_TIMEOUT_MS)),
                status: Mutex::new(PumpStatus::Created),
                stopping: AtomicBool::new(false),
                active_workers: AtomicUsize::new(0),
                released: AtomicBool::new(false),
                completed: AtomicUsize::new(0),
                abandoned: AtomicUsize::new(0),
                settle_failures: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
            }),
            max_concurrent_dispatches: settings.max_concurrent_dispatches.max(1),
            workers: Vec::new(),
            done_rx: None,
        }
    }

    /// The event type this pump consumes.
    pub fn event_type(&self) -> &EventType {
        &self.shared.event_type
    }

    /// The subscription this pump pulls from.
    pub fn subscription(&self) -> &Subscription {
        &self.shared.subscription
    }

    /// The dispatcher messages are handed to.
    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.shared.dispatcher.as_ref()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> PumpStatus {
        self.shared.lock_status().clone()
    }

    /// Counters so far.
    pub fn stats(&self) -> PumpStats {
        self.shared.stats()
    }

    /// Start the worker threads. Only valid once, from `Created`.
    pub fn start(&mut self) -> Result<(), PumpError> {
        if !self
            .shared
            .transition(PumpStatus::Running, |status| {
                matches!(status, PumpStatus::Created)
            })
        {
            return Err(PumpError::NotStartable {
                event_type: self.shared.event_type.clone(),
                status: self.status().as_label(),
            });
        }

        let count = self.max_concurrent_dispatches;
        let (done_tx, done_rx) = mpsc::channel();
        self.done_rx = Some(done_rx);
        self.shared.active_workers.store(count, Ordering::SeqCst);

        for index in 0..count {
            let shared = Arc::clone(&self.shared);
            let done = done_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("pump-{}-{}", self.shared.event_type, index))
                .spawn(move || {
                    let _exit = WorkerExit {
                        shared: Arc::clone(&shared),
                        done,
                    };
                    shared.run();
                });

            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(source) => {
                    error!(
                        event_type = %self.shared.event_type,
                        worker = index,
                        error = %source,
                        "could not spawn pump worker"
                    );
                    self.signal_stop();
                    self.shared.workers_exited(count - index);
                    return Err(PumpError::Spawn {
                        event_type: self.shared.event_type.clone(),
                        source,
                    });
                }
            }
        }

        info!(
            event_type = %self.shared.event_type,
            topic_path = %self.shared.subscription.topic_path,
            subscription = %self.shared.subscription.name,
            workers = count,
            "message pump started"
        );
        Ok(())
    }

    /// Signal the workers to stop without waiting.
    pub fn signal_stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
    }

    /// Signal the workers to stop and wait for them to finish.
    ///
    /// In-flight dispatches run to completion and their messages are
    /// completed or abandoned before this returns. Returns the pump's
    /// statistics.
    pub fn stop(&mut self) -> PumpStats {
        self.signal_stop();
        if self.workers.is_empty() {
            self.shared.stop_unstarted();
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!(event_type = %self.shared.event_type, "pump worker panicked");
            }
        }
        self.shared.stats()
    }

    /// Like [`stop`](Self::stop), but give in-flight dispatches at most
    /// `grace` to finish.
    ///
    /// If the grace period runs out the receiver is released, the pump is
    /// marked stopped, and the busy workers are detached.
    pub fn stop_with_grace(&mut self, grace: Duration) -> Result<PumpStats, PumpError> {
        self.signal_stop();
        if self.workers.is_empty() {
            self.shared.stop_unstarted();
            return Ok(self.shared.stats());
        }

        let deadline = Instant::now() + grace;
        let mut finished = 0;
        if let Some(done) = &self.done_rx {
            while finished < self.workers.len() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match done.recv_timeout(remaining) {
                    Ok(()) => finished += 1,
                    Err(_) => break,
                }
            }
        }

        if finished == self.workers.len() {
            return Ok(self.stop());
        }

        let stuck = self.workers.len() - finished;
        warn!(
            event_type = %self.shared.event_type,
            stuck,
            grace = ?grace,
            "shutdown grace exceeded, detaching busy pump workers"
        );
        self.shared.force_stop();
        self.workers.clear();
        Err(PumpError::GraceExceeded {
            event_type: self.shared.event_type.clone(),
            grace,
            stuck,
        })
    }
}

impl Drop for MessagePump {
    fn drop(&mut self) {
        self.signal_stop();
        if self.workers.is_empty() {
            self.shared.stop_unstarted();
        }
        // Don't join on drop - the last worker to exit releases the receiver
    }
}

/// Accounts for a worker leaving its loop, also when it unwinds.
struct WorkerExit {
    shared: Arc<Shared>,
    done: DoneSender<()>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared
                .fault(ReceiveError::Panicked("pump worker panicked".to_string()));
        }
        self.shared.workers_exited(1);
        let _ = self.done.send(());
    }
}

impl Shared {
    fn run(&self) {
        while !self.stopping.load(Ordering::SeqCst) {
            self.polls.fetch_add(1, Ordering::Relaxed);

            let received =
                panic::catch_unwind(AssertUnwindSafe(|| self.receiver.receive(self.receive_timeout)))
                    .unwrap_or_else(|payload| {
                        Err(ReceiveError::Panicked(panic_reason(payload.as_ref())))
                    });

            match received {
                Ok(Some(message)) => self.process(&message),
                Ok(None) => {
                    // Nothing available, check for stop and poll again
                }
                Err(error) => {
                    self.fault(error);
                    break;
                }
            }
        }
    }

    fn process(&self, message: &Message) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatcher.dispatch(message)))
            .unwrap_or_else(|payload| {
                Err(DispatchError::Panicked {
                    event_type: self.event_type.clone(),
                    message_id: message.id.clone(),
                    reason: panic_reason(payload.as_ref()),
                })
            });

        match outcome {
            Ok(()) => match self.receiver.complete(message) {
                Ok(()) => {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        event_type = %self.event_type,
                        message_id = %message.id,
                        "message completed"
                    );
                }
                Err(error) => {
                    self.settle_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_type = %self.event_type,
                        message_id = %message.id,
                        error = %error,
                        "could not complete message"
                    );
                }
            },
            Err(dispatch_error) => {
                warn!(
                    event_type = %self.event_type,
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    kind = dispatch_error.as_label(),
                    error = %dispatch_error,
                    "dispatch failed, abandoning message"
                );
                self.observer
                    .dispatch_failed(&self.event_type, message, &dispatch_error);

                match self.receiver.abandon(message, &dispatch_error.to_string()) {
                    Ok(()) => {
                        self.abandoned.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => {
                        self.settle_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            event_type = %self.event_type,
                            message_id = %message.id,
                            error = %error,
                            "could not abandon message"
                        );
                    }
                }
            }
        }
    }

    fn fault(&self, receive_error: ReceiveError) {
        self.stopping.store(true, Ordering::SeqCst);
        let receive_error = Arc::new(receive_error);
        if self.transition(
            PumpStatus::Faulted(Arc::clone(&receive_error)),
            PumpStatus::is_running,
        ) {
            error!(
                event_type = %self.event_type,
                subscription = %self.subscription.name,
                kind = receive_error.as_label(),
                error = %receive_error,
                "message pump faulted"
            );
        }
    }

    fn workers_exited(&self, count: usize) {
        if self.active_workers.fetch_sub(count, Ordering::SeqCst) == count {
            self.release();
            if self.transition(PumpStatus::Stopped, PumpStatus::is_running) {
                info!(event_type = %self.event_type, "message pump stopped");
            }
        }
    }

    fn stop_unstarted(&self) {
        self.release();
        self.transition(PumpStatus::Stopped, |status| {
            matches!(status, PumpStatus::Created)
        });
    }

    fn force_stop(&self) {
        self.release();
        if self.transition(PumpStatus::Stopped, PumpStatus::is_running) {
            info!(event_type = %self.event_type, "message pump stopped");
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.receiver.close();
            debug!(event_type = %self.event_type, "receiver released");
        }
    }

    fn transition(&self, next: PumpStatus, allowed: impl FnOnce(&PumpStatus) -> bool) -> bool {
        {
            let mut status = self.lock_status();
            if !allowed(&status) {
                return false;
            }
            *status = next.clone();
        }
        self.observer.status_changed(&self.event_type, &next);
        true
    }

    fn lock_status(&self) -> MutexGuard<'_, PumpStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> PumpStats {
        PumpStats {
            messages_completed: self.completed.load(Ordering::Relaxed),
            messages_abandoned: self.abandoned.load(Ordering::Relaxed),
            settle_failures: self.settle_failures.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
        }
    }
}
