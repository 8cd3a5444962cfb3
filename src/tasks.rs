//! Background search tasks.
//!
//! `/process-search` hands work to a [`TaskPool`]: an unbounded queue
//! drained by a fixed number of workers. Each submission gets a
//! [`TaskRecord`] in the [`TaskRegistry`] so its progress can be looked up.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::search::{SearchNotifyFlow, SearchOutcome};

/// Lifecycle of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    NoResults,
    Completed { total_results: usize },
    Failed { message: String },
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TaskState::Queued | TaskState::Running)
    }
}

impl From<SearchOutcome> for TaskState {
    fn from(outcome: SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::NoResults => TaskState::NoResults,
            SearchOutcome::Completed { total_results } => TaskState::Completed { total_results },
            SearchOutcome::Failed { message } => TaskState::Failed { message },
        }
    }
}

/// Status of one submitted search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub query: String,
    pub connection_id: String,
    #[serde(flatten)]
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    records: HashMap<Uuid, TaskRecord>,
    order: VecDeque<Uuid>,
}

/// In-memory task records, oldest evicted first once `max_retained` is
/// exceeded.
#[derive(Debug)]
pub struct TaskRegistry {
    inner: RwLock<RegistryInner>,
    max_retained: usize,
}

impl TaskRegistry {
    pub fn new(max_retained: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            max_retained: max_retained.max(1),
        }
    }

    /// Record a new queued task and return its id.
    pub async fn insert(&self, query: &str, connection_id: &str) -> Uuid {
        let record = TaskRecord {
            id: Uuid::new_v4(),
            query: query.to_string(),
            connection_id: connection_id.to_string(),
            state: TaskState::Queued,
            submitted_at: Utc::now(),
            finished_at: None,
        };
        let id = record.id;

        let mut inner = self.inner.write().await;
        inner.records.insert(id, record);
        inner.order.push_back(id);
        while inner.order.len() > self.max_retained {
            if let Some(evicted) = inner.order.pop_front() {
                inner.records.remove(&evicted);
            }
        }
        id
    }

    /// Move a task to `state`. Unknown (evicted) ids are ignored.
    pub async fn update(&self, id: Uuid, state: TaskState) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.records.get_mut(&id) {
            if state.is_finished() {
                record.finished_at = Some(Utc::now());
            }
            record.state = state;
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.inner.read().await.records.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

struct SearchJob {
    id: Uuid,
    query: String,
    connection_id: String,
}

/// Worker pool running [`SearchNotifyFlow`] jobs.
pub struct TaskPool {
    sender: mpsc::UnboundedSender<SearchJob>,
    registry: Arc<TaskRegistry>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    /// Spawn `workers` workers on the current runtime.
    pub fn start(flow: SearchNotifyFlow, registry: Arc<TaskRegistry>, workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let flow = Arc::new(flow);

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&flow),
                    Arc::clone(&registry),
                    Arc::clone(&receiver),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!(workers = workers.max(1), "Task pool started");
        Self {
            sender,
            registry,
            shutdown_tx,
            workers: Mutex::new(handles),
        }
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }

    /// Queue a search. Never waits for a worker.
    pub async fn submit(&self, query: &str, connection_id: &str) -> Result<Uuid> {
        let id = self.registry.insert(query, connection_id).await;
        let job = SearchJob {
            id,
            query: query.to_string(),
            connection_id: connection_id.to_string(),
        };
        if self.sender.send(job).is_err() {
            let message = "task pool is shut down".to_string();
            self.registry
                .update(id, TaskState::Failed { message: message.clone() })
                .await;
            return Err(Error::Api(message));
        }
        counter!("tasks_submitted_total").increment(1);
        gauge!("tasks_queued").increment(1.0);
        debug!(task_id = %id, "Search task queued");
        Ok(id)
    }

    /// Stop workers after their current job and wait for them.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Task worker ended abnormally: {}", e);
            }
        }
        info!("Task pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    flow: Arc<SearchNotifyFlow>,
    registry: Arc<TaskRegistry>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<SearchJob>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let job = {
            let mut rx = receiver.lock().await;
            // Shutdown wins over a job that became ready at the same time.
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else { break };

        gauge!("tasks_queued").decrement(1.0);
        registry.update(job.id, TaskState::Running).await;
        debug!(worker, task_id = %job.id, "Running search task");

        let state = TaskState::from(flow.run(&job.query, &job.connection_id).await);
        let outcome = match state {
            TaskState::Failed { .. } => "failed",
            TaskState::NoResults => "no_results",
            _ => "completed",
        };
        counter!("tasks_finished_total", "outcome" => outcome).increment(1);
        registry.update(job.id, state).await;
    }
    debug!(worker, "Task worker exiting");
}
