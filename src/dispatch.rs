//! Event dispatch
//!
//! Every accepted webhook becomes a [`HookEvent`] on a bounded queue. A
//! fixed pool of workers takes events off the queue and starts one
//! concurrent dispatch unit per event: parse, check the trigger, resolve the
//! build target and notify it. Failures end the unit and are logged; they never reach the
//! HTTP caller, which was answered when the event was queued.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::agent::HookAgent;
use crate::config::DispatchConfig;
use crate::error::{RelayError, Result};
use crate::notifier::Notifier;
use crate::targets::TargetStore;

/// Read-only collaborators shared by every dispatch unit
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub targets: Arc<TargetStore>,
    pub notifier: Arc<Notifier>,
}

impl DispatchContext {
    pub fn new(targets: TargetStore, notifier: Notifier) -> Self {
        Self {
            targets: Arc::new(targets),
            notifier: Arc::new(notifier),
        }
    }
}

/// A webhook accepted by the HTTP layer and waiting for dispatch
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub id: String,
    pub hook_name: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl HookEvent {
    pub fn new(hook_name: String, payload: Bytes) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            hook_name,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// How a dispatch unit ended when nothing went wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The build target was triggered
    Notified { target: String },
    /// The event is not one that triggers builds
    Skipped { agent: &'static str },
}

/// Run one dispatch unit for a raw payload.
pub async fn dispatch_event(
    context: &DispatchContext,
    hook_name: &str,
    payload: &[u8],
) -> Result<DispatchOutcome> {
    let mut agent = HookAgent::for_hook_name(hook_name);
    agent.parse(payload)?;

    if !agent.can_trigger_event() {
        debug!("Agent cannot trigger event: {}", agent.name());
        return Ok(DispatchOutcome::Skipped {
            agent: agent.name(),
        });
    }

    let environment = agent.environment();
    let project = agent.hook_project();
    let branch = agent.hook_branch();
    let target = context
        .targets
        .match_build_target(environment.as_str(), project, branch)
        .ok_or_else(|| {
            RelayError::ConfigError(format!(
                "No build target for environment '{}' project '{}' branch '{}'",
                environment, project, branch
            ))
        })?;

    context.notifier.notify(&target).await?;
    Ok(DispatchOutcome::Notified {
        target: target.name,
    })
}

/// Sending side of the dispatch queue. Cheap to clone; the workers stop
/// once every handle is dropped and the queue is empty.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<HookEvent>,
}

impl DispatchQueue {
    /// Queue an event without waiting. Returns the dispatch id.
    pub fn submit(&self, hook_name: impl Into<String>, payload: Bytes) -> Result<String> {
        let event = HookEvent::new(hook_name.into(), payload);
        let id = event.id.clone();
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::QueueFull,
            TrySendError::Closed(_) => RelayError::QueueClosed,
        })?;
        Ok(id)
    }
}

/// The running dispatch workers
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait until the workers and every unit they started have finished.
    /// Only returns after all [`DispatchQueue`] handles are gone.
    pub async fn drain(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("Dispatch worker ended abnormally: {}", e);
            }
        }
        info!("All dispatch workers stopped");
    }
}

fn queue(capacity: usize) -> (DispatchQueue, mpsc::Receiver<HookEvent>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (DispatchQueue { sender }, receiver)
}

/// Start `config.workers` workers over a queue of `config.queue_capacity`.
pub fn spawn_workers(
    context: DispatchContext,
    config: DispatchConfig,
) -> (DispatchQueue, WorkerPool) {
    let (queue, receiver) = queue(config.queue_capacity);
    let capacity = queue.sender.max_capacity();
    let receiver = Arc::new(Mutex::new(receiver));

    let mut workers = JoinSet::new();
    for worker_id in 0..config.workers {
        workers.spawn(run_worker(worker_id, context.clone(), Arc::clone(&receiver)));
    }
    info!(
        "Started {} dispatch workers (queue capacity {})",
        workers.len(),
        capacity
    );

    (queue, WorkerPool { workers })
}

/// Takes events off the queue and starts a unit for each one without
/// waiting for it, so a slow build target only holds up its own unit. The
/// worker returns once the queue is closed and its units have finished.
async fn run_worker(
    worker_id: usize,
    context: DispatchContext,
    receiver: Arc<Mutex<mpsc::Receiver<HookEvent>>>,
) {
    let mut units = JoinSet::new();
    loop {
        tokio::select! {
            event = async { receiver.lock().await.recv().await } => {
                let Some(event) = event else {
                    break;
                };
                debug!(
                    "Worker {} dispatching {} ({}) received at {}",
                    worker_id,
                    event.id,
                    event.hook_name,
                    event.received_at.to_rfc3339()
                );
                units.spawn(run_unit(context.clone(), event));
            }
            Some(result) = units.join_next(), if !units.is_empty() => {
                report_aborted(result);
            }
        }
    }

    while let Some(result) = units.join_next().await {
        report_aborted(result);
    }
    debug!("Dispatch worker {} stopped", worker_id);
}

async fn run_unit(context: DispatchContext, event: HookEvent) {
    match dispatch_event(&context, &event.hook_name, &event.payload).await {
        Ok(DispatchOutcome::Notified { target }) => {
            info!("Dispatch {} triggered build target '{}'", event.id, target);
        }
        Ok(DispatchOutcome::Skipped { agent }) => {
            debug!("Dispatch {} skipped by {}", event.id, agent);
        }
        Err(e) => {
            error!("Dispatch {} failed: {}", event.id, e);
        }
    }
}

// A panicking unit ends its own task only.
fn report_aborted(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        error!("Dispatch unit aborted: {}", e);
    }
}
