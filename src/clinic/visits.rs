use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::validation;
use crate::entities::{payment, pet, veterinarian, visit};
use crate::error::ClinicResult;
use crate::lifecycle::{self, Lifecycle, RecordKind, RecordView};
use crate::mirror::{self, MirrorEvent, ParentRef, Synchronizer};

#[derive(Debug, Deserialize)]
pub struct NewVisit {
    pub pet_id: i32,
    pub veterinarian_id: Option<i32>,
    pub reason: String,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub cost: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitChanges {
    pub veterinarian_id: Option<i32>,
    pub reason: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub cost: Option<Decimal>,
}

pub fn remote_row(visit: &visit::Model) -> Value {
    json!({
        "reason": visit.reason,
        "diagnosis": visit.diagnosis.clone().unwrap_or_default(),
        "treatment": visit.treatment.clone().unwrap_or_default(),
        "notes": visit.notes.clone().unwrap_or_default(),
        "cost": validation::from_cents(visit.cost_cents),
        "visited_at": visit.visited_at,
        "active": visit.active,
    })
}

fn links(pet_key: &str, vet_key: Option<&str>) -> Vec<ParentRef> {
    let mut parents = vec![ParentRef {
        column: "pet_id",
        kind: RecordKind::Pet,
        key: pet_key.to_string(),
        required: true,
    }];
    if let Some(vet_key) = vet_key {
        parents.push(ParentRef {
            column: "veterinarian_id",
            kind: RecordKind::Veterinarian,
            key: vet_key.to_string(),
            required: false,
        });
    }
    parents
}

pub fn creation_event(visit: &visit::Model, pet_key: &str, vet_key: Option<&str>) -> MirrorEvent {
    let mut row = remote_row(visit);
    row["veterinarian_id"] = Value::Null;

    MirrorEvent::Create {
        kind: RecordKind::Visit,
        key: visit.mirror_id.clone(),
        row,
        parents: links(pet_key, vet_key),
    }
}

/// Records a visit of an active pet, optionally with an active veterinarian.
pub async fn create(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    input: NewVisit,
) -> ClinicResult<visit::Model> {
    let reason = validation::required("reason", input.reason)?;
    let cost_cents = match input.cost {
        Some(cost) => validation::to_cents("cost", cost)?,
        None => 0,
    };
    let (active, deleted_at) = Lifecycle::Active.columns();

    let txn = db.begin().await?;
    let pet = lifecycle::find_in::<pet::Entity, _>(&txn, input.pet_id, RecordView::Active).await?;
    let vet = match input.veterinarian_id {
        Some(vet_id) => Some(
            lifecycle::find_in::<veterinarian::Entity, _>(&txn, vet_id, RecordView::Active)
                .await?,
        ),
        None => None,
    };

    let new_visit = visit::ActiveModel {
        mirror_id: Set(mirror::new_mirror_key()),
        pet_id: Set(pet.id),
        veterinarian_id: Set(vet.as_ref().map(|v| v.id)),
        reason: Set(reason),
        diagnosis: Set(validation::optional(input.diagnosis)),
        treatment: Set(validation::optional(input.treatment)),
        notes: Set(validation::optional(input.notes)),
        cost_cents: Set(cost_cents),
        visited_at: Set(chrono::Utc::now().naive_utc()),
        active: Set(active),
        deleted_at: Set(deleted_at),
        ..Default::default()
    };

    let visit = new_visit.insert(&txn).await?;
    txn.commit().await?;

    info!("Recorded visit {} for pet {} ({})", visit.id, pet.id, pet.name);
    crate::metrics::record_created(RecordKind::Visit);

    mirror.publish(creation_event(
        &visit,
        &pet.mirror_id,
        vet.as_ref().map(|v| v.mirror_id.as_str()),
    ));
    Ok(visit)
}

pub async fn update(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
    changes: VisitChanges,
) -> ClinicResult<visit::Model> {
    let txn = db.begin().await?;
    let current = lifecycle::find_in::<visit::Entity, _>(&txn, id, RecordView::Active).await?;
    let pet = lifecycle::find_in::<pet::Entity, _>(&txn, current.pet_id, RecordView::All).await?;

    let vet = match changes.veterinarian_id {
        Some(vet_id) => Some(
            lifecycle::find_in::<veterinarian::Entity, _>(&txn, vet_id, RecordView::Active)
                .await?,
        ),
        None => match current.veterinarian_id {
            Some(vet_id) => Some(
                lifecycle::find_in::<veterinarian::Entity, _>(&txn, vet_id, RecordView::All)
                    .await?,
            ),
            None => None,
        },
    };

    let mut active_visit: visit::ActiveModel = current.into();
    if changes.veterinarian_id.is_some() {
        active_visit.veterinarian_id = Set(vet.as_ref().map(|v| v.id));
    }
    if let Some(reason) = changes.reason {
        active_visit.reason = Set(validation::required("reason", reason)?);
    }
    if let Some(diagnosis) = changes.diagnosis {
        active_visit.diagnosis = Set(validation::optional(Some(diagnosis)));
    }
    if let Some(treatment) = changes.treatment {
        active_visit.treatment = Set(validation::optional(Some(treatment)));
    }
    if let Some(notes) = changes.notes {
        active_visit.notes = Set(validation::optional(Some(notes)));
    }
    if let Some(cost) = changes.cost {
        active_visit.cost_cents = Set(validation::to_cents("cost", cost)?);
    }

    let visit = active_visit.update(&txn).await?;
    txn.commit().await?;

    mirror.publish(MirrorEvent::Update {
        kind: RecordKind::Visit,
        key: visit.mirror_id.clone(),
        row: remote_row(&visit),
        parents: links(&pet.mirror_id, vet.as_ref().map(|v| v.mirror_id.as_str())),
    });
    Ok(visit)
}

/// Refused while the visit has active payments.
pub async fn soft_delete(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<visit::Model> {
    super::deactivate_guarded::<visit::Entity, payment::Entity>(
        db,
        mirror,
        id,
        payment::Column::VisitId,
    )
    .await
}

/// Refused while the pet is inactive.
pub async fn restore(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<visit::Model> {
    super::reactivate_under::<visit::Entity, pet::Entity>(db, mirror, id, |v| v.pet_id).await
}

pub async fn get(db: &DatabaseConnection, id: i32, view: RecordView) -> ClinicResult<visit::Model> {
    lifecycle::find_in::<visit::Entity, _>(db, id, view).await
}

/// All visits, newest first.
pub async fn list(db: &DatabaseConnection, view: RecordView) -> ClinicResult<Vec<visit::Model>> {
    Ok(lifecycle::scoped::<visit::Entity>(view)
        .order_by_desc(visit::Column::VisitedAt)
        .order_by_desc(visit::Column::Id)
        .all(db)
        .await?)
}

pub async fn payments(
    db: &DatabaseConnection,
    visit_id: i32,
    view: RecordView,
) -> ClinicResult<Vec<payment::Model>> {
    lifecycle::find_in::<visit::Entity, _>(db, visit_id, RecordView::All).await?;

    Ok(lifecycle::scoped::<payment::Entity>(view)
        .filter(payment::Column::VisitId.eq(visit_id))
        .order_by_desc(payment::Column::PaidAt)
        .all(db)
        .await?)
}

pub async fn purge(db: &DatabaseConnection, id: i32) -> ClinicResult<()> {
    super::purge::<visit::Entity>(db, id).await
}
