use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::validation;
use crate::entities::{owner, pet, visit};
use crate::error::ClinicResult;
use crate::lifecycle::{self, Lifecycle, RecordKind, RecordView};
use crate::mirror::{self, MirrorEvent, ParentRef, Synchronizer};

#[derive(Debug, Deserialize)]
pub struct NewPet {
    pub owner_id: i32,
    pub name: String,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PetChanges {
    pub owner_id: Option<i32>,
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

pub fn remote_row(pet: &pet::Model) -> Value {
    json!({
        "name": pet.name,
        "species": pet.species.clone().unwrap_or_default(),
        "breed": pet.breed.clone().unwrap_or_default(),
        "birth_date": pet.birth_date,
        "registered_at": pet.registered_at,
        "active": pet.active,
    })
}

fn owner_link(owner_key: &str) -> ParentRef {
    ParentRef {
        column: "owner_id",
        kind: RecordKind::Owner,
        key: owner_key.to_string(),
        required: true,
    }
}

pub fn creation_event(pet: &pet::Model, owner_key: &str) -> MirrorEvent {
    MirrorEvent::Create {
        kind: RecordKind::Pet,
        key: pet.mirror_id.clone(),
        row: remote_row(pet),
        parents: vec![owner_link(owner_key)],
    }
}

/// Registers a pet under an active owner.
pub async fn create(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    input: NewPet,
) -> ClinicResult<pet::Model> {
    let name = validation::required_within("name", input.name, validation::NAME_MAX)?;
    let species = validation::optional_within("species", input.species, validation::SPECIES_MAX)?;
    let breed = validation::optional_within("breed", input.breed, validation::BREED_MAX)?;
    let birth_date = validation::birth_date(input.birth_date, validation::today())?;
    let (active, deleted_at) = Lifecycle::Active.columns();

    let txn = db.begin().await?;
    let owner =
        lifecycle::find_in::<owner::Entity, _>(&txn, input.owner_id, RecordView::Active).await?;

    let new_pet = pet::ActiveModel {
        mirror_id: Set(mirror::new_mirror_key()),
        owner_id: Set(owner.id),
        name: Set(name),
        species: Set(species),
        breed: Set(breed),
        birth_date: Set(birth_date),
        registered_at: Set(chrono::Utc::now().naive_utc()),
        active: Set(active),
        deleted_at: Set(deleted_at),
        ..Default::default()
    };

    let pet = new_pet.insert(&txn).await?;
    txn.commit().await?;

    info!("Registered pet {} ({}) for owner {}", pet.id, pet.name, owner.id);
    crate::metrics::record_created(RecordKind::Pet);

    mirror.publish(creation_event(&pet, &owner.mirror_id));
    Ok(pet)
}

/// Edits an active pet; moving it requires the new owner to be active.
pub async fn update(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
    changes: PetChanges,
) -> ClinicResult<pet::Model> {
    let txn = db.begin().await?;
    let current = lifecycle::find_in::<pet::Entity, _>(&txn, id, RecordView::Active).await?;
    let owner_id = changes.owner_id.unwrap_or(current.owner_id);
    let owner = lifecycle::find_in::<owner::Entity, _>(&txn, owner_id, RecordView::Active).await?;

    let mut active_pet: pet::ActiveModel = current.into();
    if changes.owner_id.is_some() {
        active_pet.owner_id = Set(owner.id);
    }
    if let Some(name) = changes.name {
        let name = validation::required_within("name", name, validation::NAME_MAX)?;
        active_pet.name = Set(name);
    }
    if let Some(species) = changes.species {
        active_pet.species = Set(validation::optional_within(
            "species",
            Some(species),
            validation::SPECIES_MAX,
        )?);
    }
    if let Some(breed) = changes.breed {
        active_pet.breed = Set(validation::optional_within(
            "breed",
            Some(breed),
            validation::BREED_MAX,
        )?);
    }
    if let Some(birth_date) = changes.birth_date {
        active_pet.birth_date =
            Set(validation::birth_date(Some(birth_date), validation::today())?);
    }

    let pet = active_pet.update(&txn).await?;
    txn.commit().await?;

    mirror.publish(MirrorEvent::Update {
        kind: RecordKind::Pet,
        key: pet.mirror_id.clone(),
        row: remote_row(&pet),
        parents: vec![owner_link(&owner.mirror_id)],
    });
    Ok(pet)
}

/// Refused while the pet has active visits.
pub async fn soft_delete(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<pet::Model> {
    super::deactivate_guarded::<pet::Entity, visit::Entity>(db, mirror, id, visit::Column::PetId)
        .await
}

/// Refused while the owner is inactive.
pub async fn restore(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<pet::Model> {
    super::reactivate_under::<pet::Entity, owner::Entity>(db, mirror, id, |p| p.owner_id).await
}

pub async fn get(db: &DatabaseConnection, id: i32, view: RecordView) -> ClinicResult<pet::Model> {
    lifecycle::find_in::<pet::Entity, _>(db, id, view).await
}

pub async fn list(db: &DatabaseConnection, view: RecordView) -> ClinicResult<Vec<pet::Model>> {
    Ok(lifecycle::scoped::<pet::Entity>(view)
        .order_by_asc(pet::Column::Name)
        .order_by_asc(pet::Column::Id)
        .all(db)
        .await?)
}

/// Visit history of a pet, newest first.
pub async fn visits(
    db: &DatabaseConnection,
    pet_id: i32,
    view: RecordView,
) -> ClinicResult<Vec<visit::Model>> {
    lifecycle::find_in::<pet::Entity, _>(db, pet_id, RecordView::All).await?;

    Ok(lifecycle::scoped::<visit::Entity>(view)
        .filter(visit::Column::PetId.eq(pet_id))
        .order_by_desc(visit::Column::VisitedAt)
        .order_by_desc(visit::Column::Id)
        .all(db)
        .await?)
}

pub async fn purge(db: &DatabaseConnection, id: i32) -> ClinicResult<()> {
    super::purge::<pet::Entity>(db, id).await
}
