use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
};
use sea_orm::DatabaseConnection;

use super::{record_action, ViewQuery};
use crate::clinic::owners::{self, NewOwner, OwnerChanges};
use crate::entities::{owner, pet};
use crate::error::ClinicResult;
use crate::mirror::Synchronizer;

pub async fn list_owners(
    Extension(db): Extension<DatabaseConnection>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<owner::Model>>> {
    let owners = owners::list(&db, query.view).await?;
    record_action("owners", "list_owners", None, query.view.as_str());
    Ok(Json(owners))
}

pub async fn create_owner(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Json(payload): Json<NewOwner>,
) -> ClinicResult<(StatusCode, Json<owner::Model>)> {
    let owner = owners::create(&db, &mirror, payload).await?;
    record_action("owners", "create_owner", Some(owner.id), "Owner registered");
    Ok((StatusCode::CREATED, Json(owner)))
}

pub async fn get_owner(
    Extension(db): Extension<DatabaseConnection>,
    Path(owner_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<owner::Model>> {
    Ok(Json(owners::get(&db, owner_id, query.view).await?))
}

pub async fn update_owner(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(owner_id): Path<i32>,
    Json(payload): Json<OwnerChanges>,
) -> ClinicResult<Json<owner::Model>> {
    let owner = owners::update(&db, &mirror, owner_id, payload).await?;
    record_action("owners", "update_owner", Some(owner_id), "Owner updated");
    Ok(Json(owner))
}

pub async fn delete_owner(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(owner_id): Path<i32>,
) -> ClinicResult<Json<owner::Model>> {
    let owner = owners::soft_delete(&db, &mirror, owner_id).await?;
    record_action("owners", "deactivate_owner", Some(owner_id), "Owner deactivated");
    Ok(Json(owner))
}

pub async fn restore_owner(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(owner_id): Path<i32>,
) -> ClinicResult<Json<owner::Model>> {
    let owner = owners::restore(&db, &mirror, owner_id).await?;
    record_action("owners", "restore_owner", Some(owner_id), "Owner restored");
    Ok(Json(owner))
}

pub async fn list_owner_pets(
    Extension(db): Extension<DatabaseConnection>,
    Path(owner_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<pet::Model>>> {
    Ok(Json(owners::pets(&db, owner_id, query.view).await?))
}
