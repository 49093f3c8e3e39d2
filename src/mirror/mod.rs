//! Best-effort replication of local record changes to the remote table store.
//!
//! The local database stays the only source of truth. Clinic operations
//! publish a [`MirrorEvent`] after their local commit; a single background
//! task applies events in order, retries transient failures and logs
//! everything else. Nothing here can fail a local write.
//!
//! Local and remote rows are linked by `mirror_id`, a UUID minted when the
//! local row is created and written to both stores.

pub mod backfill;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::MirrorConfig;
use crate::lifecycle::RecordKind;

pub use remote::{DisabledRemote, MirrorError, RemoteTable, RestTableClient};

/// Events buffered ahead of the delivery task before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Column holding the shared identifier in every remote table.
pub const MIRROR_KEY_COLUMN: &str = "mirror_id";

/// Mints the identifier shared by a new local row and its remote copy.
pub fn new_mirror_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reference from a new row to a parent that must be resolved remotely.
#[derive(Clone, Debug, PartialEq)]
pub struct ParentRef {
    /// Column on the child row receiving the remote parent id.
    pub column: &'static str,
    pub kind: RecordKind,
    pub key: String,
    /// A missing required parent skips the write; a missing optional one is
    /// written as null.
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MirrorEvent {
    Create {
        kind: RecordKind,
        key: String,
        row: Value,
        parents: Vec<ParentRef>,
    },
    Update {
        kind: RecordKind,
        key: String,
        row: Value,
        parents: Vec<ParentRef>,
    },
    SetActive {
        kind: RecordKind,
        key: String,
        active: bool,
    },
}

impl MirrorEvent {
    pub fn kind(&self) -> RecordKind {
        match self {
            MirrorEvent::Create { kind, .. }
            | MirrorEvent::Update { kind, .. }
            | MirrorEvent::SetActive { kind, .. } => *kind,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            MirrorEvent::Create { key, .. }
            | MirrorEvent::Update { key, .. }
            | MirrorEvent::SetActive { key, .. } => key,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            MirrorEvent::Create { .. } => "create",
            MirrorEvent::Update { .. } => "update",
            MirrorEvent::SetActive { active: true, .. } => "restore",
            MirrorEvent::SetActive { active: false, .. } => "deactivate",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Written,
    /// Update or state change matched no remote row.
    NoMatch,
    /// Create skipped because a required parent is not mirrored.
    MissingParent,
}

/// Id of the remote row carrying `key`, if any.
pub async fn remote_id(
    remote: &dyn RemoteTable,
    kind: RecordKind,
    key: &str,
) -> Result<Option<Value>, MirrorError> {
    let rows = remote
        .select(kind.table(), MIRROR_KEY_COLUMN, key, "id")
        .await?;

    Ok(rows
        .into_iter()
        .next()
        .and_then(|row| row.get("id").cloned()))
}

/// Applies one event against the remote store, once.
pub async fn apply(remote: &dyn RemoteTable, event: &MirrorEvent) -> Result<Outcome, MirrorError> {
    match event {
        MirrorEvent::Create {
            kind,
            key,
            row,
            parents,
        } => {
            let mut row = into_object(row);

            for parent in parents {
                match remote_id(remote, parent.kind, &parent.key).await? {
                    Some(id) => {
                        row.insert(parent.column.to_string(), id);
                    }
                    None if parent.required => {
                        warn!(
                            "⚠️ {} {} not found remotely, skipping mirror of {} {}",
                            parent.kind, parent.key, kind, key
                        );
                        return Ok(Outcome::MissingParent);
                    }
                    None => {
                        row.insert(parent.column.to_string(), Value::Null);
                    }
                }
            }

            row.insert(MIRROR_KEY_COLUMN.to_string(), Value::String(key.clone()));
            remote.insert(kind.table(), &Value::Object(row)).await?;
            Ok(Outcome::Written)
        }
        MirrorEvent::Update {
            kind,
            key,
            row,
            parents,
        } => {
            let mut row = into_object(row);

            // Unresolvable links are left untouched rather than cleared.
            for parent in parents {
                if let Some(id) = remote_id(remote, parent.kind, &parent.key).await? {
                    row.insert(parent.column.to_string(), id);
                }
            }

            let matched = remote
                .update(kind.table(), MIRROR_KEY_COLUMN, key, &Value::Object(row))
                .await?;
            Ok(if matched == 0 { Outcome::NoMatch } else { Outcome::Written })
        }
        MirrorEvent::SetActive { kind, key, active } => {
            let patch = serde_json::json!({ "active": active });
            let matched = remote
                .update(kind.table(), MIRROR_KEY_COLUMN, key, &patch)
                .await?;
            Ok(if matched == 0 { Outcome::NoMatch } else { Outcome::Written })
        }
    }
}

fn into_object(row: &Value) -> Map<String, Value> {
    match row {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl From<&MirrorConfig> for RetryPolicy {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff,
        }
    }
}

enum Command {
    Event(MirrorEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background mirror task. Cheap to clone.
#[derive(Clone)]
pub struct Synchronizer {
    tx: mpsc::Sender<Command>,
    enabled: bool,
}

impl Synchronizer {
    /// Starts the delivery task. Must run inside a Tokio runtime.
    pub fn spawn(remote: Arc<dyn RemoteTable>, policy: RetryPolicy) -> Self {
        Self::spawn_with_capacity(remote, policy, DEFAULT_QUEUE_CAPACITY)
    }

    /// Like [`Synchronizer::spawn`] with at most `capacity` queued events.
    pub fn spawn_with_capacity(
        remote: Arc<dyn RemoteTable>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> Self {
        let enabled = remote.is_enabled();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run(remote, policy, rx));
        Self { tx, enabled }
    }

    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::spawn_with_capacity(
            remote_from_config(config),
            RetryPolicy::from(config),
            config.queue_capacity,
        )
    }

    /// Synchronizer whose remote is [`DisabledRemote`].
    pub fn disabled() -> Self {
        Self::spawn(Arc::new(DisabledRemote), RetryPolicy::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queues an event. Never blocks and never fails the caller: when the
    /// queue is full the event is dropped and left for the backfill tool.
    pub fn publish(&self, event: MirrorEvent) {
        if !self.enabled {
            debug!("Mirror disabled, dropping {} event for {}", event.action(), event.kind());
            return;
        }

        let table = event.kind().table();
        match self.tx.try_send(Command::Event(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(Command::Event(event))) => {
                warn!(
                    "⚠️ Mirror queue full, dropping {} of {} {}",
                    event.action(),
                    event.kind(),
                    event.key()
                );
                record(table, "dropped");
            }
            Err(_) => {
                error!("Mirror task has stopped; event dropped");
                record(table, "dropped");
            }
        }
    }

    /// Resolves once every event published before this call was handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Picks the REST client when both credentials are present, the no-op
/// remote otherwise.
pub fn remote_from_config(config: &MirrorConfig) -> Arc<dyn RemoteTable> {
    match config.credentials() {
        Some((url, key)) => match RestTableClient::new(url, key) {
            Ok(client) => {
                info!("✅ Remote mirror configured at {}", url);
                Arc::new(client)
            }
            Err(e) => {
                error!("❌ Could not build remote mirror client: {}", e);
                Arc::new(DisabledRemote)
            }
        },
        None => {
            warn!("⚠️ SUPABASE_URL or SUPABASE_KEY not set. Remote mirror disabled.");
            Arc::new(DisabledRemote)
        }
    }
}

async fn run(
    remote: Arc<dyn RemoteTable>,
    policy: RetryPolicy,
    mut rx: mpsc::Receiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Event(event) => deliver(remote.as_ref(), policy, &event).await,
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Mirror task finished");
}

async fn deliver(remote: &dyn RemoteTable, policy: RetryPolicy, event: &MirrorEvent) {
    let table = event.kind().table();
    let mut attempt = 1;

    loop {
        // A create whose response was lost may already be there.
        if attempt > 1 && matches!(event, MirrorEvent::Create { .. }) {
            if let Ok(Some(_)) = remote_id(remote, event.kind(), event.key()).await {
                record(table, "written");
                return;
            }
        }

        match apply(remote, event).await {
            Ok(Outcome::Written) => {
                info!("✅ Mirrored {} of {} {}", event.action(), event.kind(), event.key());
                record(table, "written");
                return;
            }
            Ok(Outcome::NoMatch) => {
                debug!(
                    "No remote row for {} {}, {} skipped",
                    event.kind(),
                    event.key(),
                    event.action()
                );
                record(table, "no_match");
                return;
            }
            Ok(Outcome::MissingParent) => {
                record(table, "missing_parent");
                return;
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "Mirror {} of {} {} failed (attempt {}/{}): {}",
                    event.action(),
                    event.kind(),
                    event.key(),
                    attempt,
                    policy.max_attempts,
                    e
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    "❌ Mirror {} of {} {} abandoned: {}",
                    event.action(),
                    event.kind(),
                    event.key(),
                    e
                );
                record(table, "failed");
                return;
            }
        }
    }
}

fn record(table: &'static str, outcome: &'static str) {
    metrics::counter!("vetclinic_mirror_events_total", "table" => table, "outcome" => outcome)
        .increment(1);
}
