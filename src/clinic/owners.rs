use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::validation;
use crate::entities::{owner, pet};
use crate::error::ClinicResult;
use crate::lifecycle::{self, Lifecycle, RecordKind, RecordView};
use crate::mirror::{self, MirrorEvent, Synchronizer};

#[derive(Debug, Deserialize)]
pub struct NewOwner {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OwnerChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

pub fn remote_row(owner: &owner::Model) -> Value {
    json!({
        "name": owner.name,
        "phone": owner.phone.clone().unwrap_or_default(),
        "email": owner.email.clone().unwrap_or_default(),
        "address": owner.address.clone().unwrap_or_default(),
        "registered_at": owner.registered_at,
        "active": owner.active,
    })
}

pub fn creation_event(owner: &owner::Model) -> MirrorEvent {
    MirrorEvent::Create {
        kind: RecordKind::Owner,
        key: owner.mirror_id.clone(),
        row: remote_row(owner),
        parents: Vec::new(),
    }
}

pub async fn create(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    input: NewOwner,
) -> ClinicResult<owner::Model> {
    let name = validation::required_within("name", input.name, validation::NAME_MAX)?;
    let email = validation::email(input.email)?;
    let phone = validation::optional_within("phone", input.phone, validation::PHONE_MAX)?;
    let (active, deleted_at) = Lifecycle::Active.columns();

    let new_owner = owner::ActiveModel {
        mirror_id: Set(mirror::new_mirror_key()),
        name: Set(name),
        phone: Set(phone),
        email: Set(email),
        address: Set(validation::optional(input.address)),
        registered_at: Set(chrono::Utc::now().naive_utc()),
        active: Set(active),
        deleted_at: Set(deleted_at),
        ..Default::default()
    };

    let owner = new_owner.insert(db).await?;
    info!("Registered owner {} ({})", owner.id, owner.name);
    crate::metrics::record_created(RecordKind::Owner);

    mirror.publish(creation_event(&owner));
    Ok(owner)
}

/// Edits an active owner.
pub async fn update(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
    changes: OwnerChanges,
) -> ClinicResult<owner::Model> {
    let current = lifecycle::find_in::<owner::Entity, _>(db, id, RecordView::Active).await?;

    let mut active_owner: owner::ActiveModel = current.into();
    if let Some(name) = changes.name {
        let name = validation::required_within("name", name, validation::NAME_MAX)?;
        active_owner.name = Set(name);
    }
    if let Some(phone) = changes.phone {
        active_owner.phone = Set(validation::optional_within(
            "phone",
            Some(phone),
            validation::PHONE_MAX,
        )?);
    }
    if let Some(email) = changes.email {
        active_owner.email = Set(validation::email(Some(email))?);
    }
    if let Some(address) = changes.address {
        active_owner.address = Set(validation::optional(Some(address)));
    }

    let owner = active_owner.update(db).await?;

    mirror.publish(MirrorEvent::Update {
        kind: RecordKind::Owner,
        key: owner.mirror_id.clone(),
        row: remote_row(&owner),
        parents: Vec::new(),
    });
    Ok(owner)
}

/// Refused while the owner still has active pets.
pub async fn soft_delete(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<owner::Model> {
    super::deactivate_guarded::<owner::Entity, pet::Entity>(db, mirror, id, pet::Column::OwnerId)
        .await
}

pub async fn restore(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<owner::Model> {
    super::reactivate::<owner::Entity>(db, mirror, id).await
}

pub async fn get(db: &DatabaseConnection, id: i32, view: RecordView) -> ClinicResult<owner::Model> {
    lifecycle::find_in::<owner::Entity, _>(db, id, view).await
}

pub async fn list(db: &DatabaseConnection, view: RecordView) -> ClinicResult<Vec<owner::Model>> {
    Ok(lifecycle::scoped::<owner::Entity>(view)
        .order_by_asc(owner::Column::Name)
        .order_by_asc(owner::Column::Id)
        .all(db)
        .await?)
}

/// Pets of an owner in any lifecycle state, filtered by `view`.
pub async fn pets(
    db: &DatabaseConnection,
    owner_id: i32,
    view: RecordView,
) -> ClinicResult<Vec<pet::Model>> {
    lifecycle::find_in::<owner::Entity, _>(db, owner_id, RecordView::All).await?;

    Ok(lifecycle::scoped::<pet::Entity>(view)
        .filter(pet::Column::OwnerId.eq(owner_id))
        .order_by_asc(pet::Column::Name)
        .all(db)
        .await?)
}

/// Hard delete; the owner's pets, their visits and payments go with it.
pub async fn purge(db: &DatabaseConnection, id: i32) -> ClinicResult<()> {
    super::purge::<owner::Entity>(db, id).await
}
