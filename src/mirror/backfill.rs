//! One-shot copy of local records that the remote store does not have yet.
//!
//! Tables are walked parent-first so that a child's parent has already been
//! written by the time the child is. Rows whose `mirror_id` is already present
//! remotely are skipped, which makes reruns safe.

use std::collections::HashMap;

use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{apply, remote_id, MirrorError, MirrorEvent, Outcome, RemoteTable};
use crate::clinic::{owners, payments, pets, veterinarians, visits};
use crate::entities::{owner, payment, pet, veterinarian, visit};
use crate::lifecycle::RecordKind;

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error("remote store unreachable: {0}")]
    Remote(#[from] MirrorError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct TableReport {
    pub table: &'static str,
    pub migrated: usize,
    pub skipped: usize,
    pub missing_parent: usize,
    pub failed: usize,
}

impl TableReport {
    fn new(kind: RecordKind) -> Self {
        Self {
            table: kind.table(),
            ..Default::default()
        }
    }
}

/// Copies every local record of `kinds` (any lifecycle state) that has no
/// remote counterpart. `kinds` is reordered parent-first.
pub async fn backfill(
    db: &DatabaseConnection,
    remote: &dyn RemoteTable,
    kinds: &[RecordKind],
) -> Result<Vec<TableReport>, BackfillError> {
    let kinds: Vec<RecordKind> = RecordKind::ALL
        .into_iter()
        .filter(|kind| kinds.contains(kind))
        .collect();

    for kind in &kinds {
        remote.ping(kind.table()).await?;
    }
    info!("✅ Remote store reachable, backfilling {} table(s)", kinds.len());

    let owner_keys = keys(owner::Entity::find().all(db).await?, |o| (o.id, o.mirror_id.clone()));
    let vet_keys = keys(veterinarian::Entity::find().all(db).await?, |v| {
        (v.id, v.mirror_id.clone())
    });
    let pet_rows = pet::Entity::find().all(db).await?;
    let pet_keys = keys(pet_rows.clone(), |p| (p.id, p.mirror_id.clone()));
    let visit_rows = visit::Entity::find().all(db).await?;
    let visit_keys = keys(visit_rows.clone(), |v| (v.id, v.mirror_id.clone()));

    let mut reports = Vec::with_capacity(kinds.len());

    for kind in kinds {
        let events: Vec<Option<MirrorEvent>> = match kind {
            RecordKind::Owner => owner::Entity::find()
                .all(db)
                .await?
                .iter()
                .map(|o| Some(owners::creation_event(o)))
                .collect(),
            RecordKind::Veterinarian => veterinarian::Entity::find()
                .all(db)
                .await?
                .iter()
                .map(|v| Some(veterinarians::creation_event(v)))
                .collect(),
            RecordKind::Pet => pet_rows
                .iter()
                .map(|p| {
                    owner_keys
                        .get(&p.owner_id)
                        .map(|owner_key| pets::creation_event(p, owner_key))
                })
                .collect(),
            RecordKind::Visit => visit_rows
                .iter()
                .map(|v| {
                    let vet_key = v
                        .veterinarian_id
                        .and_then(|id| vet_keys.get(&id))
                        .map(String::as_str);
                    pet_keys
                        .get(&v.pet_id)
                        .map(|pet_key| visits::creation_event(v, pet_key, vet_key))
                })
                .collect(),
            RecordKind::Payment => payment::Entity::find()
                .all(db)
                .await?
                .iter()
                .map(|p| {
                    visit_keys
                        .get(&p.visit_id)
                        .map(|visit_key| payments::creation_event(p, visit_key))
                })
                .collect(),
        };

        let report = copy_table(remote, kind, events).await;
        info!(
            "{}: {} migrated, {} already present, {} missing parent, {} failed",
            report.table, report.migrated, report.skipped, report.missing_parent, report.failed
        );
        reports.push(report);
    }

    Ok(reports)
}

fn keys<M>(rows: Vec<M>, pair: impl Fn(&M) -> (i32, String)) -> HashMap<i32, String> {
    rows.iter().map(pair).collect()
}

async fn copy_table(
    remote: &dyn RemoteTable,
    kind: RecordKind,
    events: Vec<Option<MirrorEvent>>,
) -> TableReport {
    let mut report = TableReport::new(kind);

    for event in events {
        // Foreign keys make a dangling local parent impossible; count it anyway.
        let Some(event) = event else {
            report.missing_parent += 1;
            continue;
        };

        match remote_id(remote, kind, event.key()).await {
            Ok(Some(_)) => {
                report.skipped += 1;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                error!("❌ Could not look up {} {}: {}", kind, event.key(), e);
                report.failed += 1;
                continue;
            }
        }

        match apply(remote, &event).await {
            Ok(Outcome::Written) => report.migrated += 1,
            Ok(Outcome::MissingParent) => report.missing_parent += 1,
            Ok(Outcome::NoMatch) => {
                warn!("Unexpected no-match while inserting {} {}", kind, event.key());
                report.failed += 1;
            }
            Err(e) => {
                error!("❌ Could not copy {} {}: {}", kind, event.key(), e);
                report.failed += 1;
            }
        }
    }

    report
}
