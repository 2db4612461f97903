//! Workflow step executor.
//!
//! Runs a [`WorkflowDefinition`] as a linear pipeline against the
//! [`AgentRegistry`].  Every step attempt is appended to the execution's
//! [`WorkflowState`] (`pending → running → completed | failed`) and the
//! state is persisted after each step.  The first failing step ends the
//! execution; later steps are never attempted.
//!
//! Agent-task dispatch retries with exponential backoff per the step's
//! [`RetryPolicy`](crate::workflow::RetryPolicy), each attempt bounded by a
//! timeout.  An unregistered or unavailable agent is fatal immediately.
//!
//! A soft cap bounds concurrently running executions; an execution over the
//! cap is rejected with [`AgentError::CapacityExceeded`] rather than queued.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use homestock_kernel::{AgentRegistry, AgentTask, KernelError};
use homestock_store::{StateStore, StepStatus, WorkflowState, WorkflowStatus, WorkflowStepExecution};

use crate::error::{AgentError, Result};
use crate::workflow::{StepKind, WorkflowDefinition, WorkflowStep};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the workflow executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Executions allowed in flight at once.
    pub max_concurrent_executions: usize,
    /// Deadline for one agent dispatch when the step sets none.
    pub default_step_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            default_step_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Running executions
// ---------------------------------------------------------------------------

/// Snapshot of an in-flight execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunningExecution {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
}

struct Handle {
    info: RunningExecution,
    cancel: Arc<AtomicBool>,
}

/// Releases a capacity slot on drop.
struct Slot {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Removes an execution from the running table on drop, including when the
/// caller stops awaiting `execute`.
struct Registration {
    running: Arc<DashMap<Uuid, Handle>>,
    execution_id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.running.remove(&self.execution_id).is_some() {
            debug!(execution_id = %self.execution_id, "execution deregistered");
        }
    }
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Executes workflows.  Cheaply cloneable; clones share capacity and the
/// running-execution table.
#[derive(Clone)]
pub struct WorkflowExecutor {
    registry: AgentRegistry,
    store: Arc<dyn StateStore>,
    config: ExecutorConfig,
    in_flight: Arc<AtomicUsize>,
    running: Arc<DashMap<Uuid, Handle>>,
}

impl WorkflowExecutor {
    pub fn new(registry: AgentRegistry, store: Arc<dyn StateStore>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            store,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Executions currently holding a capacity slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn running_executions(&self) -> Vec<RunningExecution> {
        self.running.iter().map(|e| e.value().info.clone()).collect()
    }

    /// Request cancellation; honoured before the next step starts.
    ///
    /// Returns `false` if no such execution is running.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        match self.running.get(&execution_id) {
            Some(handle) => {
                handle.cancel.store(true, Ordering::Release);
                info!(%execution_id, "workflow cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Load a persisted execution state.
    pub async fn load_state(
        &self,
        workflow_id: &str,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowState>> {
        Ok(self
            .store
            .load_workflow_state(workflow_id, &execution_id.to_string())
            .await?)
    }

    /// Run `definition` to completion.
    ///
    /// `Err` is returned only when the execution could not start (invalid
    /// definition, capacity exceeded).  Step failures and cancellation are
    /// reported through the returned state's `status` and `error`.
    pub async fn execute(&self, definition: &WorkflowDefinition, input: Value) -> Result<WorkflowState> {
        definition.validate()?;
        let _slot = self.acquire_slot()?;

        let mut state = WorkflowState::start(&definition.id);
        let execution_id = state.execution_id;
        state.global_context.insert("input".into(), input.clone());

        let cancel = Arc::new(AtomicBool::new(false));
        let _registration = Registration {
            running: Arc::clone(&self.running),
            execution_id,
        };
        self.running.insert(
            execution_id,
            Handle {
                info: RunningExecution {
                    execution_id,
                    workflow_id: definition.id.clone(),
                    started_at: state.started_at,
                },
                cancel: Arc::clone(&cancel),
            },
        );

        info!(
            workflow_id = %definition.id,
            %execution_id,
            steps = definition.total_steps(),
            "workflow execution started"
        );
        self.persist(&state).await;

        let outcome = self
            .run_steps(&definition.steps, input, &mut state, &cancel)
            .await;

        match outcome {
            Ok(output) => {
                state.global_context.insert("output".into(), output);
                state.finish(WorkflowStatus::Completed, None);
                info!(workflow_id = %definition.id, %execution_id, "workflow completed");
            }
            Err(AgentError::Cancelled { .. }) => {
                state.finish(WorkflowStatus::Cancelled, Some("cancelled".into()));
                info!(workflow_id = %definition.id, %execution_id, "workflow cancelled");
            }
            Err(err) => {
                warn!(workflow_id = %definition.id, %execution_id, error = %err, "workflow failed");
                state.finish(WorkflowStatus::Failed, Some(err.to_string()));
            }
        }

        self.persist(&state).await;
        Ok(state)
    }

    // -- pipeline -------------------------------------------------------------

    fn run_steps<'a>(
        &'a self,
        steps: &'a [WorkflowStep],
        input: Value,
        state: &'a mut WorkflowState,
        cancel: &'a AtomicBool,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            let mut current = input;
            for step in steps {
                if cancel.load(Ordering::Acquire) {
                    return Err(AgentError::Cancelled {
                        execution_id: state.execution_id,
                    });
                }

                state.current_step = Some(step.id.clone());
                state
                    .step_history
                    .push(WorkflowStepExecution::pending(&step.id, current.clone()));
                let idx = state.step_history.len() - 1;
                state.step_history[idx].status = StepStatus::Running;
                debug!(
                    execution_id = %state.execution_id,
                    step_id = %step.id,
                    kind = step.kind.label(),
                    "step running"
                );

                let (result, retries) = match &step.kind {
                    StepKind::AgentTask {
                        agent_id,
                        task_type,
                        parameters,
                    } => {
                        self.run_agent_task(
                            step,
                            agent_id,
                            task_type,
                            parameters,
                            current.clone(),
                            state.execution_id,
                        )
                        .await
                    }
                    StepKind::Sequential { steps: children } => {
                        (self.run_steps(children, current.clone(), state, cancel).await, 0)
                    }
                    StepKind::Decision | StepKind::Conditional | StepKind::Parallel => {
                        (Ok(current.clone()), 0)
                    }
                };

                let record = &mut state.step_history[idx];
                record.retry_count = retries;
                record.completed_at = Some(Utc::now());
                match result {
                    Ok(output) => {
                        record.status = StepStatus::Completed;
                        record.output = Some(output.clone());
                        current = output;
                        debug!(step_id = %step.id, retries, "step completed");
                        self.persist(state).await;
                    }
                    Err(err) => {
                        record.status = StepStatus::Failed;
                        record.error = Some(err.to_string());
                        warn!(step_id = %step.id, error = %err, "step failed");
                        self.persist(state).await;
                        return Err(err);
                    }
                }
            }
            Ok(current)
        })
    }

    /// Dispatch one agent task with retry and timeout.
    ///
    /// Returns the outcome together with the number of retries performed.
    async fn run_agent_task(
        &self,
        step: &WorkflowStep,
        agent_id: &str,
        task_type: &str,
        parameters: &Value,
        input: Value,
        execution_id: Uuid,
    ) -> (Result<Value>, u32) {
        let agent = match self.registry.resolve(agent_id) {
            Ok(agent) => agent,
            Err(KernelError::AgentNotFound { .. }) => {
                return (
                    Err(AgentError::AgentNotFound {
                        step_id: step.id.clone(),
                        agent_id: agent_id.to_string(),
                    }),
                    0,
                );
            }
            Err(err) => {
                return (
                    Err(AgentError::StepFailed {
                        step_id: step.id.clone(),
                        reason: err.to_string(),
                    }),
                    0,
                );
            }
        };

        let policy = step.retry.clone().unwrap_or_default();
        let timeout = step
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_step_timeout);
        let max_attempts = policy.max_retries.saturating_add(1);
        let mut delay = policy.initial_delay();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            debug!(step_id = %step.id, agent_id, attempt, max_attempts, "dispatching task");
            let task = AgentTask::new(task_type, input.clone())
                .with_parameters(parameters.clone())
                .with_execution(execution_id);

            let err = match tokio::time::timeout(timeout, agent.process_task(task)).await {
                Ok(Ok(outcome)) if outcome.success => return (Ok(outcome.data), attempt - 1),
                Ok(Ok(outcome)) => AgentError::StepFailed {
                    step_id: step.id.clone(),
                    reason: outcome
                        .error
                        .unwrap_or_else(|| "agent reported failure".into()),
                },
                Ok(Err(e)) => AgentError::StepFailed {
                    step_id: step.id.clone(),
                    reason: e.to_string(),
                },
                Err(_elapsed) => AgentError::StepTimeout {
                    step_id: step.id.clone(),
                    timeout,
                },
            };
            warn!(step_id = %step.id, agent_id, attempt, error = %err, "task attempt failed");

            if attempt < max_attempts {
                debug!(delay = ?delay, "retrying after delay");
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
            }
            last_error = Some(err);
        }

        let err = last_error.unwrap_or_else(|| AgentError::StepFailed {
            step_id: step.id.clone(),
            reason: "no attempt was made".into(),
        });
        (Err(err), max_attempts.saturating_sub(1))
    }

    // -- internals ------------------------------------------------------------

    fn acquire_slot(&self) -> Result<Slot> {
        let limit = self.config.max_concurrent_executions;
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .map_err(|_| {
                warn!(limit, "workflow capacity exceeded");
                AgentError::CapacityExceeded { limit }
            })?;
        Ok(Slot {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Persistence failures are logged; the execution carries on in memory.
    async fn persist(&self, state: &WorkflowState) {
        let execution_id = state.execution_id.to_string();
        if let Err(err) = self
            .store
            .save_workflow_state(&state.workflow_id, &execution_id, state)
            .await
        {
            warn!(workflow_id = %state.workflow_id, %execution_id, %err, "failed to persist workflow state");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
