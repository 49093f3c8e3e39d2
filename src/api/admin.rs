use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use sea_orm::DatabaseConnection;

use super::auth::CurrentUser;
use super::record_action;
use crate::clinic::{self, owners, payments, pets, veterinarians, visits, Summary};
use crate::error::{ClinicError, ClinicResult};
use crate::lifecycle::RecordKind;
use crate::mirror::Synchronizer;

pub async fn summary(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
) -> ClinicResult<Json<Summary>> {
    Ok(Json(clinic::summary(&db, &mirror).await?))
}

/// Hard delete. Not mirrored: the remote copy keeps the row.
pub async fn purge_record(
    Extension(db): Extension<DatabaseConnection>,
    Extension(user): Extension<CurrentUser>,
    Path((table, id)): Path<(String, i32)>,
) -> ClinicResult<StatusCode> {
    user.require_admin("purging records requires the admin role")?;

    let kind = RecordKind::from_table(&table)
        .ok_or_else(|| ClinicError::validation(format!("unknown table {}", table)))?;

    match kind {
        RecordKind::Owner => owners::purge(&db, id).await?,
        RecordKind::Veterinarian => veterinarians::purge(&db, id).await?,
        RecordKind::Pet => pets::purge(&db, id).await?,
        RecordKind::Visit => visits::purge(&db, id).await?,
        RecordKind::Payment => payments::purge(&db, id).await?,
    }

    record_action(kind.table(), "purge", Some(id), "Record permanently deleted");
    Ok(StatusCode::NO_CONTENT)
}
