use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
};
use sea_orm::DatabaseConnection;

use super::auth::CurrentUser;
use super::visits::VisitBody;
use super::{record_action, ViewQuery};
use crate::clinic::veterinarians::{self, NewVeterinarian, VeterinarianChanges};
use crate::entities::veterinarian;
use crate::error::ClinicResult;
use crate::mirror::Synchronizer;

pub async fn list_veterinarians(
    Extension(db): Extension<DatabaseConnection>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<veterinarian::Model>>> {
    let vets = veterinarians::list(&db, query.view).await?;
    record_action("veterinarians", "list_veterinarians", None, query.view.as_str());
    Ok(Json(vets))
}

pub async fn create_veterinarian(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Json(payload): Json<NewVeterinarian>,
) -> ClinicResult<(StatusCode, Json<veterinarian::Model>)> {
    let vet = veterinarians::create(&db, &mirror, payload).await?;
    record_action(
        "veterinarians",
        "create_veterinarian",
        Some(vet.id),
        "Veterinarian registered",
    );
    Ok((StatusCode::CREATED, Json(vet)))
}

pub async fn get_veterinarian(
    Extension(db): Extension<DatabaseConnection>,
    Path(vet_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<veterinarian::Model>> {
    Ok(Json(veterinarians::get(&db, vet_id, query.view).await?))
}

pub async fn update_veterinarian(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(vet_id): Path<i32>,
    Json(payload): Json<VeterinarianChanges>,
) -> ClinicResult<Json<veterinarian::Model>> {
    let vet = veterinarians::update(&db, &mirror, vet_id, payload).await?;
    record_action("veterinarians", "update_veterinarian", Some(vet_id), "Veterinarian updated");
    Ok(Json(vet))
}

pub async fn delete_veterinarian(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(vet_id): Path<i32>,
) -> ClinicResult<Json<veterinarian::Model>> {
    let vet = veterinarians::soft_delete(&db, &mirror, vet_id).await?;
    record_action(
        "veterinarians",
        "deactivate_veterinarian",
        Some(vet_id),
        "Veterinarian deactivated",
    );
    Ok(Json(vet))
}

pub async fn restore_veterinarian(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Extension(user): Extension<CurrentUser>,
    Path(vet_id): Path<i32>,
) -> ClinicResult<Json<veterinarian::Model>> {
    user.require_admin("restoring a veterinarian requires the admin role")?;

    let vet = veterinarians::restore(&db, &mirror, vet_id).await?;
    record_action(
        "veterinarians",
        "restore_veterinarian",
        Some(vet_id),
        "Veterinarian restored",
    );
    Ok(Json(vet))
}

pub async fn list_veterinarian_visits(
    Extension(db): Extension<DatabaseConnection>,
    Path(vet_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<VisitBody>>> {
    let visits = veterinarians::visits(&db, vet_id, query.view).await?;
    Ok(Json(visits.into_iter().map(VisitBody::from).collect()))
}
