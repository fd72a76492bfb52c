//! Async front door to the scheduler.
//!
//! [`Runtime::start`] spawns a single control task that owns the
//! [`Scheduler`] outright. Callers talk to it through an unbounded channel;
//! execution units report back through a second one. The control task
//! handles one event at a time and never awaits a task's completion.

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wheelhouse_core::{PoolConfig, WheelhouseError};

use crate::partition::partition_len;
use crate::scheduler::runner::Scheduler;
use crate::scheduler::task::{settle_channel, TaskHandle, TaskResult};
use crate::scheduler::types::{PoolSnapshot, TaskRequest};
use crate::unit::{InlineUnitFactory, ThreadUnitFactory, UnitEventReceiver, UnitFactory};

/// Requests handled by the control task.
#[derive(Debug)]
pub enum ControlEvent {
    Submit {
        request: TaskRequest,
        settle: oneshot::Sender<TaskResult>,
    },
    Snapshot(oneshot::Sender<PoolSnapshot>),
    Shutdown,
}

/// Handle to a running pool. Dropping it stops the control task; tasks that
/// have not settled resolve as abandoned.
pub struct Runtime {
    control_tx: mpsc::UnboundedSender<ControlEvent>,
    config: PoolConfig,
    capacity: usize,
    loop_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Start a pool with thread-backed units, or inline units when
    /// `config.legacy` is set. Must be called from within a tokio runtime.
    pub fn start(config: PoolConfig) -> Result<Self, WheelhouseError> {
        let (unit_tx, unit_rx) = mpsc::unbounded_channel();
        if config.legacy {
            Self::with_factory(config, InlineUnitFactory::new(unit_tx), unit_rx)
        } else {
            Self::with_factory(config, ThreadUnitFactory::new(unit_tx), unit_rx)
        }
    }

    /// Start a pool over a custom unit factory. `reports` must be the
    /// receiving end of the channel the factory's units report through.
    pub fn with_factory<F>(
        config: PoolConfig,
        factory: F,
        reports: UnitEventReceiver,
    ) -> Result<Self, WheelhouseError>
    where
        F: UnitFactory + 'static,
        F::Unit: 'static,
    {
        let handle = Handle::try_current()
            .map_err(|_| WheelhouseError::Other("Runtime::start needs a tokio runtime".into()))?;
        let scheduler =
            Scheduler::new(&config, factory).map_err(|e| WheelhouseError::Spawn(e.to_string()))?;
        let capacity = scheduler.capacity();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let loop_handle = handle.spawn(Self::event_loop(scheduler, control_rx, reports));
        info!(capacity, persistence = config.persistence, "Pool runtime started");

        Ok(Self {
            control_tx,
            config,
            capacity,
            loop_handle: Some(loop_handle),
        })
    }

    /// Control loop owning all scheduling state.
    async fn event_loop<F: UnitFactory>(
        mut scheduler: Scheduler<F>,
        mut control_rx: mpsc::UnboundedReceiver<ControlEvent>,
        mut reports: UnitEventReceiver,
    ) {
        loop {
            tokio::select! {
                // Unit finished a range
                Some(event) = reports.recv() => scheduler.on_unit_report(event),
                // Caller request
                cmd = control_rx.recv() => match cmd {
                    Some(ControlEvent::Submit { request, settle }) => {
                        if let Err(e) = scheduler.submit(request, settle) {
                            warn!(error = %e, "Submission rejected");
                        }
                    }
                    Some(ControlEvent::Snapshot(reply)) => {
                        let _ = reply.send(scheduler.snapshot());
                    }
                    Some(ControlEvent::Shutdown) | None => break,
                },
            }
        }
        scheduler.shutdown();
        info!("Control loop stopped");
    }

    /// Queue a task. Partitioning errors are reported here, before the task
    /// reaches the pool.
    pub fn submit(&self, request: TaskRequest) -> Result<TaskHandle, WheelhouseError> {
        let threads = if self.config.legacy {
            1
        } else {
            request.threads.max(1)
        };
        partition_len(request.input_len(), threads)?;

        let (settle, handle) = settle_channel();
        self.control_tx
            .send(ControlEvent::Submit { request, settle })
            .map_err(|_| WheelhouseError::RuntimeStopped)?;
        Ok(handle)
    }

    pub async fn snapshot(&self) -> Result<PoolSnapshot, WheelhouseError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(ControlEvent::Snapshot(tx))
            .map_err(|_| WheelhouseError::RuntimeStopped)?;
        rx.await.map_err(|_| WheelhouseError::RuntimeStopped)
    }

    /// Stop the control task and tear down every unit.
    pub async fn shutdown(mut self) {
        let _ = self.control_tx.send(ControlEvent::Shutdown);
        if let Some(handle) = self.loop_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Control loop ended abnormally");
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let _ = self.control_tx.send(ControlEvent::Shutdown);
    }
}
