use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::validation;
use crate::entities::{veterinarian, visit};
use crate::error::ClinicResult;
use crate::lifecycle::{self, Lifecycle, RecordKind, RecordView};
use crate::mirror::{self, MirrorEvent, Synchronizer};

#[derive(Debug, Deserialize)]
pub struct NewVeterinarian {
    pub name: String,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VeterinarianChanges {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub fn remote_row(vet: &veterinarian::Model) -> Value {
    json!({
        "name": vet.name,
        "specialty": vet.specialty.clone().unwrap_or_default(),
        "phone": vet.phone.clone().unwrap_or_default(),
        "email": vet.email.clone().unwrap_or_default(),
        "active": vet.active,
    })
}

pub fn creation_event(vet: &veterinarian::Model) -> MirrorEvent {
    MirrorEvent::Create {
        kind: RecordKind::Veterinarian,
        key: vet.mirror_id.clone(),
        row: remote_row(vet),
        parents: Vec::new(),
    }
}

pub async fn create(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    input: NewVeterinarian,
) -> ClinicResult<veterinarian::Model> {
    let name = validation::required_within("name", input.name, validation::NAME_MAX)?;
    let email = validation::email(input.email)?;
    let specialty =
        validation::optional_within("specialty", input.specialty, validation::SPECIALTY_MAX)?;
    let phone = validation::optional_within("phone", input.phone, validation::PHONE_MAX)?;
    let (active, deleted_at) = Lifecycle::Active.columns();

    let new_vet = veterinarian::ActiveModel {
        mirror_id: Set(mirror::new_mirror_key()),
        name: Set(name),
        specialty: Set(specialty),
        phone: Set(phone),
        email: Set(email),
        active: Set(active),
        deleted_at: Set(deleted_at),
        ..Default::default()
    };

    let vet = new_vet.insert(db).await?;
    info!("Registered veterinarian {} ({})", vet.id, vet.name);
    crate::metrics::record_created(RecordKind::Veterinarian);

    mirror.publish(creation_event(&vet));
    Ok(vet)
}

pub async fn update(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
    changes: VeterinarianChanges,
) -> ClinicResult<veterinarian::Model> {
    let current =
        lifecycle::find_in::<veterinarian::Entity, _>(db, id, RecordView::Active).await?;

    let mut active_vet: veterinarian::ActiveModel = current.into();
    if let Some(name) = changes.name {
        let name = validation::required_within("name", name, validation::NAME_MAX)?;
        active_vet.name = Set(name);
    }
    if let Some(specialty) = changes.specialty {
        active_vet.specialty = Set(validation::optional_within(
            "specialty",
            Some(specialty),
            validation::SPECIALTY_MAX,
        )?);
    }
    if let Some(phone) = changes.phone {
        active_vet.phone = Set(validation::optional_within(
            "phone",
            Some(phone),
            validation::PHONE_MAX,
        )?);
    }
    if let Some(email) = changes.email {
        active_vet.email = Set(validation::email(Some(email))?);
    }

    let vet = active_vet.update(db).await?;

    mirror.publish(MirrorEvent::Update {
        kind: RecordKind::Veterinarian,
        key: vet.mirror_id.clone(),
        row: remote_row(&vet),
        parents: Vec::new(),
    });
    Ok(vet)
}

/// Never blocked: past visits keep pointing at a retired veterinarian.
pub async fn soft_delete(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<veterinarian::Model> {
    super::deactivate::<veterinarian::Entity>(db, mirror, id).await
}

/// Callers gate this on the admin role.
pub async fn restore(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<veterinarian::Model> {
    super::reactivate::<veterinarian::Entity>(db, mirror, id).await
}

pub async fn get(
    db: &DatabaseConnection,
    id: i32,
    view: RecordView,
) -> ClinicResult<veterinarian::Model> {
    lifecycle::find_in::<veterinarian::Entity, _>(db, id, view).await
}

pub async fn list(
    db: &DatabaseConnection,
    view: RecordView,
) -> ClinicResult<Vec<veterinarian::Model>> {
    Ok(lifecycle::scoped::<veterinarian::Entity>(view)
        .order_by_asc(veterinarian::Column::Name)
        .order_by_asc(veterinarian::Column::Id)
        .all(db)
        .await?)
}

/// Visits attended by a veterinarian, newest first.
pub async fn visits(
    db: &DatabaseConnection,
    vet_id: i32,
    view: RecordView,
) -> ClinicResult<Vec<visit::Model>> {
    lifecycle::find_in::<veterinarian::Entity, _>(db, vet_id, RecordView::All).await?;

    Ok(lifecycle::scoped::<visit::Entity>(view)
        .filter(visit::Column::VeterinarianId.eq(vet_id))
        .order_by_desc(visit::Column::VisitedAt)
        .all(db)
        .await?)
}

/// Hard delete; visits survive with their veterinarian cleared.
pub async fn purge(db: &DatabaseConnection, id: i32) -> ClinicResult<()> {
    super::purge::<veterinarian::Entity>(db, id).await
}
