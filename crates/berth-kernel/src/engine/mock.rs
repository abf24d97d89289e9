//! In-memory engine for tests.
//!
//! Records every call, keeps per-container run state, and lets a test script
//! failures and exec output without a daemon.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use berth_types::TransferDirection;
use parking_lot::Mutex;

use super::{ContainerEngine, ContainerSpec, ExecOutput, ManagedContainer};
use crate::config::{MANAGED_LABEL, SESSION_ID_LABEL};
use crate::error::EngineError;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Create { spec: ContainerSpec },
    Exec { container_id: String, cmd: Vec<String> },
    Copy {
        container_id: String,
        direction: TransferDirection,
        source: String,
        dest: String,
    },
    Inspect { container_id: String },
    Logs { container_id: String, tail: usize },
    Remove { container_id: String },
    ListManaged,
}

impl EngineCall {
    pub fn op(&self) -> MockOp {
        match self {
            EngineCall::Create { .. } => MockOp::Create,
            EngineCall::Exec { .. } => MockOp::Exec,
            EngineCall::Copy { .. } => MockOp::Copy,
            EngineCall::Inspect { .. } => MockOp::Inspect,
            EngineCall::Logs { .. } => MockOp::Logs,
            EngineCall::Remove { .. } => MockOp::Remove,
            EngineCall::ListManaged => MockOp::ListManaged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Create,
    Exec,
    Copy,
    Inspect,
    Logs,
    Remove,
    ListManaged,
}

/// Failure shape a scripted op returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    NoSuchContainer,
    NotRunning,
    Rejected(String),
    Unavailable,
    NonZeroExit { code: i64, stderr: String },
}

impl MockFailure {
    fn to_error(&self, container_id: &str) -> EngineError {
        match self {
            MockFailure::NoSuchContainer => EngineError::NoSuchContainer(container_id.to_string()),
            MockFailure::NotRunning => EngineError::NotRunning(container_id.to_string()),
            MockFailure::Rejected(msg) => EngineError::rejected(500, msg.clone()),
            MockFailure::Unavailable => EngineError::unavailable("mock engine unavailable"),
            MockFailure::NonZeroExit { code, stderr } => EngineError::NonZeroExit {
                code: *code,
                stderr: stderr.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    labels: HashMap<String, String>,
    state: RunState,
    logs: Vec<String>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<EngineCall>,
    containers: HashMap<String, MockContainer>,
    fail_next: HashMap<MockOp, VecDeque<MockFailure>>,
    fail_always: HashMap<MockOp, MockFailure>,
    exec_outputs: VecDeque<ExecOutput>,
    exec_delay: Option<Duration>,
    create_delay: Option<Duration>,
}

/// Scriptable in-memory [`ContainerEngine`].
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
    next_id: AtomicU64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one kind.
    pub fn calls_of(&self, op: MockOp) -> Vec<EngineCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Fail the next call of `op` once.
    pub fn fail_next(&self, op: MockOp, failure: MockFailure) {
        self.state
            .lock()
            .fail_next
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    /// Fail every call of `op` until [`Self::heal`].
    pub fn fail_always(&self, op: MockOp, failure: MockFailure) {
        self.state.lock().fail_always.insert(op, failure);
    }

    pub fn heal(&self, op: MockOp) {
        let mut state = self.state.lock();
        state.fail_always.remove(&op);
        state.fail_next.remove(&op);
    }

    /// Queue output for the next exec. Defaults to empty success.
    pub fn push_exec_output(&self, output: ExecOutput) {
        self.state.lock().exec_outputs.push_back(output);
    }

    /// Make every exec sleep before completing.
    pub fn set_exec_delay(&self, delay: Duration) {
        self.state.lock().exec_delay = Some(delay);
    }

    /// Make every create sleep after the container exists, before returning.
    pub fn set_create_delay(&self, delay: Duration) {
        self.state.lock().create_delay = Some(delay);
    }

    /// Simulate an out-of-band stop.
    pub fn stop_container(&self, container_id: &str) {
        if let Some(c) = self.state.lock().containers.get_mut(container_id) {
            c.state = RunState::Stopped;
        }
    }

    /// Simulate an out-of-band removal.
    pub fn vanish(&self, container_id: &str) {
        self.state.lock().containers.remove(container_id);
    }

    /// Append log lines to a container.
    pub fn push_logs(&self, container_id: &str, lines: &[&str]) {
        if let Some(c) = self.state.lock().containers.get_mut(container_id) {
            c.logs.extend(lines.iter().map(|l| l.to_string()));
        }
    }

    /// Seed a managed container as if left by an earlier process.
    pub fn seed_managed(&self, container_id: &str, session_id: &str) {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(SESSION_ID_LABEL.to_string(), session_id.to_string());
        self.state.lock().containers.insert(
            container_id.to_string(),
            MockContainer {
                name: format!("orphan-{container_id}"),
                labels,
                state: RunState::Running,
                logs: Vec::new(),
            },
        );
    }

    /// Whether the engine still has this container.
    pub fn exists(&self, container_id: &str) -> bool {
        self.state.lock().containers.contains_key(container_id)
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    /// Record `call` and return a scripted failure, if any.
    fn enter(&self, call: EngineCall, container_id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let op = call.op();
        state.calls.push(call);

        if let Some(failure) = state.fail_next.get_mut(&op).and_then(|q| q.pop_front()) {
            return Err(failure.to_error(container_id));
        }
        if let Some(failure) = state.fail_always.get(&op) {
            return Err(failure.to_error(container_id));
        }
        Ok(())
    }

    fn running(&self, container_id: &str) -> Result<(), EngineError> {
        match self.state.lock().containers.get(container_id) {
            None => Err(EngineError::NoSuchContainer(container_id.to_string())),
            Some(c) if c.state != RunState::Running => {
                Err(EngineError::NotRunning(container_id.to_string()))
            }
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.enter(EngineCall::Create { spec: spec.clone() }, &spec.name)?;

        let (id, delay) = {
            let mut state = self.state.lock();
            if state.containers.values().any(|c| c.name == spec.name) {
                return Err(EngineError::rejected(
                    409,
                    format!("container name {} already in use", spec.name),
                ));
            }
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            let id = format!("mock{n:012x}");
            state.containers.insert(
                id.clone(),
                MockContainer {
                    name: spec.name.clone(),
                    labels: spec.labels.clone(),
                    state: RunState::Running,
                    logs: Vec::new(),
                },
            );
            (id, state.create_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(id)
    }

    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<ExecOutput, EngineError> {
        self.enter(
            EngineCall::Exec {
                container_id: container_id.to_string(),
                cmd,
            },
            container_id,
        )?;
        self.running(container_id)?;

        let delay = self.state.lock().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let output = self.state.lock().exec_outputs.pop_front();
        Ok(output.unwrap_or_default())
    }

    async fn copy(
        &self,
        container_id: &str,
        direction: TransferDirection,
        source: &str,
        dest: &str,
    ) -> Result<(), EngineError> {
        self.enter(
            EngineCall::Copy {
                container_id: container_id.to_string(),
                direction,
                source: source.to_string(),
                dest: dest.to_string(),
            },
            container_id,
        )?;
        if !self.exists(container_id) {
            return Err(EngineError::NoSuchContainer(container_id.to_string()));
        }
        Ok(())
    }

    async fn inspect_running(&self, container_id: &str) -> Result<bool, EngineError> {
        self.enter(
            EngineCall::Inspect {
                container_id: container_id.to_string(),
            },
            container_id,
        )?;
        match self.state.lock().containers.get(container_id) {
            None => Err(EngineError::NoSuchContainer(container_id.to_string())),
            Some(c) => Ok(c.state == RunState::Running),
        }
    }

    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, EngineError> {
        self.enter(
            EngineCall::Logs {
                container_id: container_id.to_string(),
                tail,
            },
            container_id,
        )?;
        let state = self.state.lock();
        let c = state
            .containers
            .get(container_id)
            .ok_or_else(|| EngineError::NoSuchContainer(container_id.to_string()))?;
        let skip = c.logs.len().saturating_sub(tail);
        Ok(c.logs[skip..].iter().map(|l| format!("{l}\n")).collect())
    }

    async fn remove(&self, container_id: &str) -> Result<(), EngineError> {
        self.enter(
            EngineCall::Remove {
                container_id: container_id.to_string(),
            },
            container_id,
        )?;
        match self.state.lock().containers.remove(container_id) {
            Some(_) => Ok(()),
            None => Err(EngineError::NoSuchContainer(container_id.to_string())),
        }
    }

    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, EngineError> {
        self.enter(EngineCall::ListManaged, "")?;
        let state = self.state.lock();
        let mut found: Vec<ManagedContainer> = state
            .containers
            .iter()
            .filter(|(_, c)| c.labels.get(MANAGED_LABEL).is_some_and(|v| v == "true"))
            .map(|(id, c)| ManagedContainer {
                id: id.clone(),
                name: Some(c.name.clone()),
                session_id: c.labels.get(SESSION_ID_LABEL).cloned(),
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}
