// src/shutdown.rs - Cancellation of background loops and the HTTP server

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Coordinates the ordered stop of every registered task.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    tasks: Arc<Mutex<TaskTable>>,
    config: ShutdownConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// SIGTERM or Ctrl+C
    Graceful,
    /// A task could not continue
    Critical(String),
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Upper bound for all tasks to finish after the signal
    pub graceful_timeout: Duration,
    /// Poll interval while waiting on a task
    pub poll_interval: Duration,
    pub force_kill_on_timeout: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            force_kill_on_timeout: true,
        }
    }
}

#[derive(Debug, Default)]
struct TaskTable {
    tasks: HashMap<String, TaskEntry>,
    reason: Option<ShutdownReason>,
    started_at: Option<Instant>,
}

#[derive(Debug)]
struct TaskEntry {
    task_type: TaskType,
    handle: Option<tokio::task::JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
    status: TaskStatus,
    priority: TaskPriority,
}

/// Kinds of long-running tasks owned by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskType {
    AlarmRefresh,
    MachineRefresh,
    StatusRebuild,
    Reconciler,
    HttpServer,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq)]
enum TaskStatus {
    Running,
    ShuttingDown,
    Completed,
    Failed(String),
}

/// Higher priorities are stopped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    /// Listeners, stopped last so in-flight requests drain
    Low = 1,
    Normal = 2,
    /// Writers to the shared store
    High = 3,
}

/// Cancellation token handed to a single task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: String,
    stop_rx: watch::Receiver<bool>,
    coordinator: ShutdownCoordinator,
}

#[derive(Debug, Clone)]
pub struct ShutdownStats {
    pub reason: ShutdownReason,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub forced_kills: usize,
    pub total_duration: Duration,
}

impl ShutdownCoordinator {
    pub fn new(config: ShutdownConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            shutdown_tx,
            tasks: Arc::new(Mutex::new(TaskTable::default())),
            config,
        }
    }

    /// Register a task before spawning it. The returned handle resolves
    /// `wait_for_shutdown` once the coordinator signals.
    pub async fn register_task(
        &self,
        name: impl Into<String>,
        task_type: TaskType,
        priority: TaskPriority,
    ) -> TaskHandle {
        let name = name.into();
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut table = self.tasks.lock().await;
        if table.reason.is_some() {
            // Late registrations see the stop signal immediately.
            let _ = stop_tx.send(true);
        }
        table.tasks.insert(
            name.clone(),
            TaskEntry {
                task_type,
                handle: None,
                stop_tx,
                status: TaskStatus::Running,
                priority,
            },
        );
        debug!(task = %name, "Registered task");

        TaskHandle {
            name,
            stop_rx,
            coordinator: self.clone(),
        }
    }

    /// Attach the join handle of a spawned task.
    pub async fn attach(&self, name: &str, handle: tokio::task::JoinHandle<()>) {
        let mut table = self.tasks.lock().await;
        if let Some(entry) = table.tasks.get_mut(name) {
            entry.handle = Some(handle);
        }
    }

    /// Spawn a listener that starts the shutdown on SIGINT or SIGTERM. The
    /// returned task finishes once the shutdown it started has completed.
    pub fn listen_for_signals(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "Failed to register SIGTERM handler");
                        return;
                    }
                };

                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                info!("Received Ctrl+C, initiating graceful shutdown");
            }

            coordinator.initiate_shutdown(ShutdownReason::Graceful).await;
        })
    }

    /// Signal every task, wait for them by priority and abort stragglers.
    pub async fn initiate_shutdown(&self, reason: ShutdownReason) -> Option<ShutdownStats> {
        let start = Instant::now();
        {
            let mut table = self.tasks.lock().await;
            if table.reason.is_some() {
                warn!("Shutdown already in progress, ignoring duplicate request");
                return None;
            }
            table.reason = Some(reason.clone());
            table.started_at = Some(start);

            for (name, entry) in table.tasks.iter_mut() {
                if entry.stop_tx.send(true).is_ok() {
                    entry.status = TaskStatus::ShuttingDown;
                    debug!(task = %name, "Sent shutdown signal");
                } else if entry.status == TaskStatus::Running {
                    entry.status = TaskStatus::ShuttingDown;
                }
            }
        }

        info!("🛑 Initiating shutdown: {:?}", reason);
        let _ = self.shutdown_tx.send(reason);

        self.wait_by_priority(start).await;
        if self.config.force_kill_on_timeout {
            self.abort_remaining().await;
        }

        let stats = self.stats().await;
        if let Some(stats) = &stats {
            info!(
                "✅ Shutdown finished in {:.2}s: {} completed, {} failed, {} forced",
                stats.total_duration.as_secs_f64(),
                stats.completed_tasks,
                stats.failed_tasks,
                stats.forced_kills
            );
        }
        stats
    }

    async fn wait_by_priority(&self, start: Instant) {
        let ordered = {
            let table = self.tasks.lock().await;
            let mut names: Vec<(String, TaskPriority)> = table
                .tasks
                .iter()
                .map(|(name, entry)| (name.clone(), entry.priority))
                .collect();
            names.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            names
        };

        for (name, priority) in ordered {
            let remaining = self.config.graceful_timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                warn!("Graceful shutdown timeout reached");
                break;
            }

            let finished = timeout(remaining, async {
                loop {
                    {
                        let table = self.tasks.lock().await;
                        match table.tasks.get(&name) {
                            Some(entry) => match &entry.status {
                                TaskStatus::Completed | TaskStatus::Failed(_) => break,
                                _ if entry.handle.as_ref().is_some_and(|h| h.is_finished()) => break,
                                _ => {}
                            },
                            None => break,
                        }
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            })
            .await;

            let mut table = self.tasks.lock().await;
            if let Some(entry) = table.tasks.get_mut(&name) {
                match finished {
                    Ok(()) => {
                        if !matches!(entry.status, TaskStatus::Failed(_)) {
                            entry.status = TaskStatus::Completed;
                        }
                        info!(task = %name, ?priority, task_type = ?entry.task_type, "Task stopped");
                    }
                    Err(_) => warn!(task = %name, "Task did not stop within timeout"),
                }
            }
        }
    }

    async fn abort_remaining(&self) {
        let mut table = self.tasks.lock().await;
        for (name, entry) in table.tasks.iter_mut() {
            if matches!(entry.status, TaskStatus::Running | TaskStatus::ShuttingDown) {
                if let Some(handle) = &entry.handle {
                    handle.abort();
                }
                entry.status = TaskStatus::Failed("force killed".to_string());
                warn!(task = %name, "🔨 Force killed task");
            }
        }
    }

    pub async fn is_shutdown_initiated(&self) -> bool {
        self.tasks.lock().await.reason.is_some()
    }

    pub async fn stats(&self) -> Option<ShutdownStats> {
        let table = self.tasks.lock().await;
        let (reason, started_at) = match (&table.reason, table.started_at) {
            (Some(reason), Some(started_at)) => (reason.clone(), started_at),
            _ => return None,
        };

        let count = |pred: &dyn Fn(&TaskStatus) -> bool| {
            table.tasks.values().filter(|e| pred(&e.status)).count()
        };

        Some(ShutdownStats {
            reason,
            total_tasks: table.tasks.len(),
            completed_tasks: count(&|s| matches!(s, TaskStatus::Completed)),
            failed_tasks: count(&|s| matches!(s, TaskStatus::Failed(_))),
            forced_kills: count(&|s| matches!(s, TaskStatus::Failed(r) if r == "force killed")),
            total_duration: started_at.elapsed(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }
}

impl TaskHandle {
    /// A handle that is never signalled, for driving loops outside a
    /// coordinator.
    pub fn detached(name: impl Into<String>) -> (Self, watch::Sender<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = Self {
            name: name.into(),
            stop_rx,
            coordinator: ShutdownCoordinator::new(ShutdownConfig::default()),
        };
        (handle, stop_tx)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Resolves once a stop has been signalled, including before the call.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.stop_rx.wait_for(|stop| *stop).await;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn mark_completed(&self) {
        let mut table = self.coordinator.tasks.lock().await;
        if let Some(entry) = table.tasks.get_mut(&self.name) {
            entry.status = TaskStatus::Completed;
        }
    }

    pub async fn mark_failed(&self, reason: String) {
        let mut table = self.coordinator.tasks.lock().await;
        if let Some(entry) = table.tasks.get_mut(&self.name) {
            entry.status = TaskStatus::Failed(reason);
        }
    }
}
