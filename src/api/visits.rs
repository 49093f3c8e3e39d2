use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::Serialize;

use super::payments::PaymentBody;
use super::{record_action, ViewQuery};
use crate::clinic::validation::from_cents;
use crate::clinic::visits::{self, NewVisit, VisitChanges};
use crate::entities::visit;
use crate::error::ClinicResult;
use crate::mirror::Synchronizer;

/// Visit as returned by the API, with the cost as a decimal amount.
#[derive(Debug, Serialize)]
pub struct VisitBody {
    #[serde(flatten)]
    pub visit: visit::Model,
    pub cost: Decimal,
}

impl From<visit::Model> for VisitBody {
    fn from(visit: visit::Model) -> Self {
        let cost = from_cents(visit.cost_cents);
        Self { visit, cost }
    }
}

pub async fn list_visits(
    Extension(db): Extension<DatabaseConnection>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<VisitBody>>> {
    let visits = visits::list(&db, query.view).await?;
    record_action("visits", "list_visits", None, query.view.as_str());
    Ok(Json(visits.into_iter().map(VisitBody::from).collect()))
}

pub async fn create_visit(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Json(payload): Json<NewVisit>,
) -> ClinicResult<(StatusCode, Json<VisitBody>)> {
    let visit = visits::create(&db, &mirror, payload).await?;
    record_action("visits", "create_visit", Some(visit.id), "Visit recorded");
    Ok((StatusCode::CREATED, Json(visit.into())))
}

pub async fn get_visit(
    Extension(db): Extension<DatabaseConnection>,
    Path(visit_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<VisitBody>> {
    Ok(Json(visits::get(&db, visit_id, query.view).await?.into()))
}

pub async fn update_visit(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(visit_id): Path<i32>,
    Json(payload): Json<VisitChanges>,
) -> ClinicResult<Json<VisitBody>> {
    let visit = visits::update(&db, &mirror, visit_id, payload).await?;
    record_action("visits", "update_visit", Some(visit_id), "Visit updated");
    Ok(Json(visit.into()))
}

pub async fn delete_visit(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(visit_id): Path<i32>,
) -> ClinicResult<Json<VisitBody>> {
    let visit = visits::soft_delete(&db, &mirror, visit_id).await?;
    record_action("visits", "deactivate_visit", Some(visit_id), "Visit deactivated");
    Ok(Json(visit.into()))
}

pub async fn restore_visit(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(visit_id): Path<i32>,
) -> ClinicResult<Json<VisitBody>> {
    let visit = visits::restore(&db, &mirror, visit_id).await?;
    record_action("visits", "restore_visit", Some(visit_id), "Visit restored");
    Ok(Json(visit.into()))
}

pub async fn list_visit_payments(
    Extension(db): Extension<DatabaseConnection>,
    Path(visit_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<PaymentBody>>> {
    let payments = visits::payments(&db, visit_id, query.view).await?;
    Ok(Json(payments.into_iter().map(PaymentBody::from).collect()))
}
