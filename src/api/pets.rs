use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
};
use sea_orm::DatabaseConnection;

use super::visits::VisitBody;
use super::{record_action, ViewQuery};
use crate::clinic::pets::{self, NewPet, PetChanges};
use crate::entities::pet;
use crate::error::ClinicResult;
use crate::mirror::Synchronizer;

pub async fn list_pets(
    Extension(db): Extension<DatabaseConnection>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<pet::Model>>> {
    let pets = pets::list(&db, query.view).await?;
    record_action("pets", "list_pets", None, query.view.as_str());
    Ok(Json(pets))
}

pub async fn create_pet(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Json(payload): Json<NewPet>,
) -> ClinicResult<(StatusCode, Json<pet::Model>)> {
    let pet = pets::create(&db, &mirror, payload).await?;
    record_action("pets", "create_pet", Some(pet.id), "Pet registered");
    Ok((StatusCode::CREATED, Json(pet)))
}

pub async fn get_pet(
    Extension(db): Extension<DatabaseConnection>,
    Path(pet_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<pet::Model>> {
    Ok(Json(pets::get(&db, pet_id, query.view).await?))
}

pub async fn update_pet(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(pet_id): Path<i32>,
    Json(payload): Json<PetChanges>,
) -> ClinicResult<Json<pet::Model>> {
    let pet = pets::update(&db, &mirror, pet_id, payload).await?;
    record_action("pets", "update_pet", Some(pet_id), "Pet updated");
    Ok(Json(pet))
}

pub async fn delete_pet(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(pet_id): Path<i32>,
) -> ClinicResult<Json<pet::Model>> {
    let pet = pets::soft_delete(&db, &mirror, pet_id).await?;
    record_action("pets", "deactivate_pet", Some(pet_id), "Pet deactivated");
    Ok(Json(pet))
}

pub async fn restore_pet(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(pet_id): Path<i32>,
) -> ClinicResult<Json<pet::Model>> {
    let pet = pets::restore(&db, &mirror, pet_id).await?;
    record_action("pets", "restore_pet", Some(pet_id), "Pet restored");
    Ok(Json(pet))
}

/// Visit history, newest first.
pub async fn list_pet_visits(
    Extension(db): Extension<DatabaseConnection>,
    Path(pet_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<VisitBody>>> {
    let visits = pets::visits(&db, pet_id, query.view).await?;
    Ok(Json(visits.into_iter().map(VisitBody::from).collect()))
}
