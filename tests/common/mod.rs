#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use vetclinic_server::clinic::owners::NewOwner;
use vetclinic_server::clinic::pets::NewPet;
use vetclinic_server::migrator::Migrator;
use vetclinic_server::mirror::{MirrorError, RemoteTable, RetryPolicy, Synchronizer};
use vetclinic_server::sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub async fn setup_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        backoff: Duration::from_millis(1),
    }
}

pub fn synchronizer(remote: &Arc<RecordingRemote>) -> Synchronizer {
    Synchronizer::spawn(remote.clone(), quick_retries())
}

pub fn owner(name: &str) -> NewOwner {
    NewOwner {
        name: name.to_string(),
        phone: Some("555-0101".to_string()),
        email: None,
        address: None,
    }
}

pub fn pet(owner_id: i32, name: &str) -> NewPet {
    NewPet {
        owner_id,
        name: name.to_string(),
        species: Some("dog".to_string()),
        breed: None,
        birth_date: None,
    }
}

/// In-memory remote table store that records every call.
pub struct RecordingRemote {
    tables: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    next_id: AtomicI64,
    calls: Mutex<Vec<String>>,
    fail_status: Mutex<Option<u16>>,
    fail_next: AtomicUsize,
    enabled: bool,
}

impl RecordingRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    /// Reports itself disabled, like an unconfigured mirror.
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    fn build(enabled: bool) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(100),
            calls: Mutex::new(Vec::new()),
            fail_status: Mutex::new(None),
            fail_next: AtomicUsize::new(0),
            enabled,
        }
    }

    /// Every call fails with `status` until cleared with `None`.
    pub fn fail_with(&self, status: Option<u16>) {
        *self.fail_status.lock().unwrap() = status;
    }

    /// The next `n` calls fail with 503.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, mirror_id: &str) -> Option<Map<String, Value>> {
        self.rows(table)
            .into_iter()
            .find(|row| row.get("mirror_id").and_then(Value::as_str) == Some(mirror_id))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn enter(&self, call: String) -> Result<(), MirrorError> {
        self.calls.lock().unwrap().push(call);

        if let Some(status) = *self.fail_status.lock().unwrap() {
            return Err(MirrorError::Rejected {
                status,
                body: "injected failure".to_string(),
            });
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(MirrorError::Rejected {
                status: 503,
                body: "injected transient failure".to_string(),
            });
        }
        Ok(())
    }
}

fn matches(row: &Map<String, Value>, column: &str, value: &str) -> bool {
    match row.get(column) {
        Some(Value::String(s)) => s == value,
        Some(other) => other.to_string() == value,
        None => false,
    }
}

#[async_trait]
impl RemoteTable for RecordingRemote {
    async fn select(
        &self,
        table: &str,
        column: &str,
        value: &str,
        columns: &str,
    ) -> Result<Vec<Value>, MirrorError> {
        self.enter(format!("select {}", table))?;

        let wanted: Vec<&str> = columns.split(',').map(str::trim).collect();
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| matches(row, column, value))
            .map(|row| {
                let projected: Map<String, Value> = row
                    .into_iter()
                    .filter(|(k, _)| wanted.contains(&"*") || wanted.contains(&k.as_str()))
                    .collect();
                Value::Object(projected)
            })
            .collect())
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<(), MirrorError> {
        self.enter(format!("insert {}", table))?;

        let mut row = row
            .as_object()
            .cloned()
            .ok_or_else(|| MirrorError::Malformed("row must be an object".to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        row.insert("id".to_string(), Value::from(id));

        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: &Value,
    ) -> Result<usize, MirrorError> {
        self.enter(format!("update {}", table))?;

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let mut matched = 0;
        for row in rows.iter_mut().filter(|row| matches(row, column, value)) {
            if let Some(fields) = patch.as_object() {
                for (k, v) in fields {
                    row.insert(k.clone(), v.clone());
                }
            }
            matched += 1;
        }
        Ok(matched)
    }

    async fn ping(&self, table: &str) -> Result<(), MirrorError> {
        self.enter(format!("ping {}", table))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
