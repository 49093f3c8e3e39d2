//! Clinic operations: create / edit / soft delete / restore per record type.
//!
//! Every mutation commits locally first and only then publishes its mirror
//! event, so the remote copy can lag but never leads.

pub mod owners;
pub mod payments;
pub mod pets;
pub mod validation;
pub mod veterinarians;
pub mod visits;

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use tracing::info;

use crate::entities::{owner, payment, pet, veterinarian, visit};
use crate::error::{ClinicError, ClinicResult};
use crate::lifecycle::{self, Lifecycle, RecordView, SoftDelete, Tracked};
use crate::mirror::{MirrorEvent, Synchronizer};

/// Soft delete with no dependents to check.
pub(crate) async fn deactivate<E>(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<E::Model>
where
    E: SoftDelete,
    E::Model: Tracked,
{
    let model = lifecycle::transition::<E, _>(db, id, Lifecycle::inactive_now()).await?;
    announce::<E>(mirror, &model);
    Ok(model)
}

/// Soft delete refused while any active `D` row points at the record through
/// `dependent_column`. Dependents are never deactivated on the caller's behalf.
pub(crate) async fn deactivate_guarded<E, D>(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
    dependent_column: D::Column,
) -> ClinicResult<E::Model>
where
    E: SoftDelete,
    E::Model: Tracked,
    D: SoftDelete,
    D::Model: Sync,
{
    let txn = db.begin().await?;

    lifecycle::find_in::<E, _>(&txn, id, RecordView::Active).await?;

    let dependents = lifecycle::count_active::<D, _>(&txn, dependent_column, id).await?;
    if dependents > 0 {
        return Err(ClinicError::ReferentialGuard {
            kind: E::KIND,
            id,
            dependent_kind: D::KIND,
            dependents,
        });
    }

    let model = lifecycle::transition::<E, _>(&txn, id, Lifecycle::inactive_now()).await?;
    txn.commit().await?;

    announce::<E>(mirror, &model);
    Ok(model)
}

/// Restore with no parent to check.
pub(crate) async fn reactivate<E>(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<E::Model>
where
    E: SoftDelete,
    E::Model: Tracked,
{
    let model = lifecycle::transition::<E, _>(db, id, Lifecycle::Active).await?;
    announce::<E>(mirror, &model);
    Ok(model)
}

/// Restore allowed only while the parent `P` returned by `parent_of` is active.
pub(crate) async fn reactivate_under<E, P>(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
    parent_of: impl Fn(&E::Model) -> i32,
) -> ClinicResult<E::Model>
where
    E: SoftDelete,
    E::Model: Tracked,
    P: SoftDelete,
{
    let txn = db.begin().await?;

    let inactive = lifecycle::find_in::<E, _>(&txn, id, RecordView::Inactive).await?;
    let parent_id = parent_of(&inactive);

    match lifecycle::find_in::<P, _>(&txn, parent_id, RecordView::Active).await {
        Ok(_) => {}
        Err(ClinicError::NotFound { .. }) => {
            return Err(ClinicError::InactiveParent {
                kind: E::KIND,
                id,
                parent_kind: P::KIND,
            })
        }
        Err(e) => return Err(e),
    }

    let model = lifecycle::transition::<E, _>(&txn, id, Lifecycle::Active).await?;
    txn.commit().await?;

    announce::<E>(mirror, &model);
    Ok(model)
}

fn announce<E>(mirror: &Synchronizer, model: &E::Model)
where
    E: SoftDelete,
    E::Model: Tracked,
{
    let active = model.lifecycle().is_active();
    let state = if active { "active" } else { "inactive" };

    mirror.publish(MirrorEvent::SetActive {
        kind: E::KIND,
        key: model.mirror_key().to_string(),
        active,
    });

    metrics::counter!(
        "vetclinic_lifecycle_transitions_total",
        "table" => E::KIND.table(),
        "to" => state
    )
    .increment(1);
    crate::metrics::record_transition(E::KIND, active);

    info!("{} {} is now {}", E::KIND, model.record_id(), state);
}

/// Hard delete. Foreign keys cascade physically to dependents (pets, visits,
/// payments) or clear the optional veterinarian link.
pub(crate) async fn purge<E>(db: &DatabaseConnection, id: i32) -> ClinicResult<()>
where
    E: SoftDelete,
{
    let res = E::delete_many()
        .filter(E::id_column().eq(id))
        .exec(db)
        .await?;

    if res.rows_affected == 0 {
        return Err(ClinicError::NotFound { kind: E::KIND, id });
    }

    tracing::warn!("{} {} purged", E::KIND, id);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub owners: u64,
    pub inactive_owners: u64,
    pub owners_with_phone: u64,
    pub owners_with_email: u64,
    pub pets: u64,
    pub veterinarians: u64,
    pub visits: u64,
    pub payments: u64,
    pub mirror_enabled: bool,
}

/// Dashboard counters over active records.
pub async fn summary(db: &DatabaseConnection, mirror: &Synchronizer) -> ClinicResult<Summary> {
    let owners = lifecycle::scoped::<owner::Entity>(RecordView::Active)
        .count(db)
        .await?;
    let inactive_owners = lifecycle::scoped::<owner::Entity>(RecordView::Inactive)
        .count(db)
        .await?;
    let owners_with_phone = lifecycle::scoped::<owner::Entity>(RecordView::Active)
        .filter(owner::Column::Phone.is_not_null())
        .filter(owner::Column::Phone.ne(""))
        .count(db)
        .await?;
    let owners_with_email = lifecycle::scoped::<owner::Entity>(RecordView::Active)
        .filter(owner::Column::Email.is_not_null())
        .filter(owner::Column::Email.ne(""))
        .count(db)
        .await?;

    Ok(Summary {
        owners,
        inactive_owners,
        owners_with_phone,
        owners_with_email,
        pets: lifecycle::scoped::<pet::Entity>(RecordView::Active).count(db).await?,
        veterinarians: lifecycle::scoped::<veterinarian::Entity>(RecordView::Active)
            .count(db)
            .await?,
        visits: lifecycle::scoped::<visit::Entity>(RecordView::Active).count(db).await?,
        payments: lifecycle::scoped::<payment::Entity>(RecordView::Active).count(db).await?,
        mirror_enabled: mirror.is_enabled(),
    })
}
