//! Session registry.
//!
//! Owns the mapping from [`SessionId`] to session record. Every session lives
//! in a [`SessionSlot`] carrying:
//!
//! - the record itself (short synchronous reads and writes only),
//! - an async operation lock that linearizes engine-mutating calls
//!   (execute, command, transfer, destroy) on that one session,
//! - a `destroyed` flag, re-checked after the lock is acquired, so an
//!   operation that queued behind a destroy fails with `NotFound` and never
//!   reaches the engine.
//!
//! Operations on different sessions never contend. Status probes and log
//! reads skip the operation lock.
//!
//! Records are inserted only after the engine confirmed container creation.
//! Once [`SessionRegistry::shutdown`] starts, no new record is ever inserted:
//! a create that finishes afterwards applies the shutdown policy to its own
//! container and fails.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use berth_types::{Session, SessionId};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};

use crate::config::{BerthConfig, ShutdownPolicy};
use crate::credentials::{CredentialRequest, CredentialResolver};
use crate::engine::ContainerEngine;
use crate::error::{BerthError, BerthResult};
use crate::orchestrator::{Orchestrator, RemoveOutcome};

/// Arguments for [`SessionRegistry::create`]. Validated by the caller.
#[derive(Debug, Clone, Default)]
pub struct CreateSession {
    pub project_path: String,
    pub name: Option<String>,
    pub credentials: CredentialRequest,
}

/// What [`SessionRegistry::startup`] found at the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Berth-labelled containers not tracked by this process.
    pub found: usize,
    /// How many of those were removed.
    pub reaped: usize,
}

struct SessionSlot {
    record: RwLock<Session>,
    ops: tokio::sync::Mutex<()>,
    destroyed: AtomicBool,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            record: RwLock::new(session),
            ops: tokio::sync::Mutex::new(()),
            destroyed: AtomicBool::new(false),
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> Session {
        self.record.read().clone()
    }
}

pub struct SessionRegistry {
    orchestrator: Orchestrator,
    resolver: CredentialResolver,
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
    /// Set once by `shutdown`. Inserts happen under this lock.
    closing: Mutex<Option<ShutdownPolicy>>,
}

impl SessionRegistry {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        resolver: CredentialResolver,
        config: Arc<BerthConfig>,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(engine, config),
            resolver,
            sessions: DashMap::new(),
            closing: Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &BerthConfig {
        self.orchestrator.config()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.lock().is_some()
    }

    /// Create a container and register its session.
    ///
    /// Nothing is inserted unless the engine confirmed creation, and nothing
    /// at all once shutdown has begun.
    pub async fn create(&self, request: CreateSession) -> BerthResult<Session> {
        if self.is_closing() {
            return Err(BerthError::ShuttingDown { op: "create_container" });
        }

        let id = SessionId::new();
        let container_name = Session::container_name_for(&self.config().container_prefix, &id);
        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.to_string());
        let credentials = self.resolver.resolve(&request.credentials);

        let container_id = self
            .orchestrator
            .create_container(&request.project_path, &container_name, &id, &name, &credentials)
            .await
            .map_err(|e| BerthError::engine("create_container", e))?;

        let runtime = credentials.profile();
        let session = Session::new(
            id,
            Some(name),
            container_id,
            container_name,
            request.project_path,
            runtime,
            credentials,
        );

        let closing = {
            let closing = self.closing.lock();
            if closing.is_none() {
                self.sessions.insert(id, Arc::new(SessionSlot::new(session.clone())));
            }
            *closing
        };
        if let Some(policy) = closing {
            self.abandon(&session, policy).await;
            return Err(BerthError::ShuttingDown { op: "create_container" });
        }

        tracing::info!(session = %id, container = %session.container_id, "Session created");
        Ok(session)
    }

    /// Apply the shutdown policy to a container created after shutdown began.
    async fn abandon(&self, session: &Session, policy: ShutdownPolicy) {
        if policy == ShutdownPolicy::Disown {
            tracing::info!(
                session = %session.id,
                container = %session.container_id,
                "Disowning container created during shutdown"
            );
            return;
        }
        match self.orchestrator.remove(&session.container_id).await {
            Ok(outcome) => {
                tracing::info!(session = %session.id, %outcome, "Removed container created during shutdown");
            }
            Err(e) => {
                tracing::warn!(
                    session = %session.id,
                    error = %e,
                    "Failed to remove container created during shutdown"
                );
            }
        }
    }

    fn slot(&self, raw_id: &str) -> BerthResult<(SessionId, Arc<SessionSlot>)> {
        let id = SessionId::parse(raw_id).map_err(|_| BerthError::not_found(raw_id))?;
        let slot = self
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BerthError::not_found(raw_id))?;
        if slot.is_destroyed() {
            return Err(BerthError::not_found(raw_id));
        }
        Ok((id, slot))
    }

    /// Current record for `raw_id`.
    pub fn get(&self, raw_id: &str) -> BerthResult<Session> {
        self.slot(raw_id).map(|(_, slot)| slot.snapshot())
    }

    /// Probe every session concurrently, update statuses, return a snapshot
    /// ordered by creation time.
    ///
    /// A failed probe only marks its own session `error`.
    pub async fn list(&self) -> Vec<Session> {
        let slots: Vec<Arc<SessionSlot>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let probes = slots.into_iter().map(|slot| async move {
            let container_id = slot.record.read().container_id.clone();
            let probe = self.orchestrator.probe(&container_id).await;
            if slot.is_destroyed() {
                return None;
            }
            let mut record = slot.record.write();
            let previous = record.observe(&probe);
            if previous != record.status {
                tracing::info!(
                    session = %record.id,
                    from = %previous,
                    to = %record.status,
                    "Session status changed"
                );
            }
            Some(record.clone())
        });

        let mut sessions: Vec<Session> = join_all(probes).await.into_iter().flatten().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Run `op` against the session while holding its operation lock.
    ///
    /// Fails with `NotFound`, without calling `op`, if the session is unknown
    /// or was destroyed while this call waited for the lock.
    pub async fn serialized<F, Fut, T>(&self, raw_id: &str, op: F) -> BerthResult<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = BerthResult<T>>,
    {
        let (_, slot) = self.slot(raw_id)?;
        let _guard = slot.ops.lock().await;
        if slot.is_destroyed() {
            return Err(BerthError::not_found(raw_id));
        }
        op(slot.snapshot()).await
    }

    /// Run a read-only `op` against the session without the operation lock.
    pub async fn read_only<F, Fut, T>(&self, raw_id: &str, op: F) -> BerthResult<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = BerthResult<T>>,
    {
        let (_, slot) = self.slot(raw_id)?;
        op(slot.snapshot()).await
    }

    /// Remove the session's container and forget the session.
    ///
    /// An engine report of "already gone" counts as success. Any other
    /// engine failure keeps the record and is returned.
    pub async fn remove(&self, raw_id: &str) -> BerthResult<(Session, RemoveOutcome)> {
        let (id, slot) = self.slot(raw_id)?;
        let _guard = slot.ops.lock().await;
        if slot.is_destroyed() {
            return Err(BerthError::not_found(raw_id));
        }

        let session = slot.snapshot();
        let outcome = self
            .orchestrator
            .remove(&session.container_id)
            .await
            .map_err(|e| BerthError::engine("remove", e))?;

        slot.destroyed.store(true, Ordering::Release);
        self.sessions.remove(&id);
        tracing::info!(session = %id, %outcome, "Session destroyed");
        Ok((session, outcome))
    }

    /// Reconcile against containers left by earlier processes.
    ///
    /// Removes them when `reap_orphans` is set; otherwise only reports them.
    pub async fn startup(&self) -> BerthResult<ReconcileReport> {
        let managed = self
            .orchestrator
            .list_managed()
            .await
            .map_err(|e| BerthError::engine("startup", e))?;

        let orphans: Vec<_> = managed
            .into_iter()
            .filter(|c| {
                let tracked = c
                    .session_id
                    .as_deref()
                    .and_then(|s| SessionId::parse(s).ok())
                    .is_some_and(|id| self.sessions.contains_key(&id));
                !tracked
            })
            .collect();

        let mut report = ReconcileReport {
            found: orphans.len(),
            reaped: 0,
        };
        if orphans.is_empty() {
            return Ok(report);
        }

        if !self.config().reap_orphans {
            tracing::info!(count = report.found, "Found orphaned berth containers; leaving them");
            return Ok(report);
        }

        for orphan in orphans {
            match self.orchestrator.remove(&orphan.id).await {
                Ok(_) => {
                    report.reaped += 1;
                    tracing::info!(container = %orphan.id, name = ?orphan.name, "Reaped orphan");
                }
                Err(e) => {
                    tracing::warn!(container = %orphan.id, error = %e, "Failed to reap orphan");
                }
            }
        }
        Ok(report)
    }

    /// Stop accepting sessions, apply `policy` to every tracked session and
    /// empty the registry.
    ///
    /// Does not wait for in-flight operations; creates still in flight apply
    /// `policy` themselves when they return. Returns how many tracked
    /// containers were removed.
    pub async fn shutdown(&self, policy: ShutdownPolicy) -> usize {
        let slots: Vec<Arc<SessionSlot>> = {
            let mut closing = self.closing.lock();
            *closing = Some(policy);
            let slots = self.sessions.iter().map(|entry| entry.value().clone()).collect();
            self.sessions.clear();
            slots
        };
        for slot in &slots {
            slot.destroyed.store(true, Ordering::Release);
        }

        if policy == ShutdownPolicy::Disown {
            tracing::info!(count = slots.len(), "Disowning sessions on shutdown");
            return 0;
        }

        let removals = slots.iter().map(|slot| {
            let session = slot.snapshot();
            async move {
                match self.orchestrator.remove(&session.container_id).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(session = %session.id, error = %e, "Failed to remove container on shutdown");
                        false
                    }
                }
            }
        });
        let removed = join_all(removals).await.into_iter().filter(|ok| *ok).count();
        tracing::info!(removed, total = slots.len(), "Destroyed sessions on shutdown");
        removed
    }
}
