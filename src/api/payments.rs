use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::Serialize;

use super::{record_action, ViewQuery};
use crate::clinic::payments::{self, NewPayment, PaymentChanges};
use crate::clinic::validation::from_cents;
use crate::entities::payment;
use crate::error::ClinicResult;
use crate::mirror::Synchronizer;

#[derive(Debug, Serialize)]
pub struct PaymentBody {
    #[serde(flatten)]
    pub payment: payment::Model,
    pub amount: Decimal,
}

impl From<payment::Model> for PaymentBody {
    fn from(payment: payment::Model) -> Self {
        let amount = from_cents(payment.amount_cents);
        Self { payment, amount }
    }
}

pub async fn list_payments(
    Extension(db): Extension<DatabaseConnection>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<Vec<PaymentBody>>> {
    let payments = payments::list(&db, query.view).await?;
    record_action("payments", "list_payments", None, query.view.as_str());
    Ok(Json(payments.into_iter().map(PaymentBody::from).collect()))
}

pub async fn create_payment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Json(payload): Json<NewPayment>,
) -> ClinicResult<(StatusCode, Json<PaymentBody>)> {
    let payment = payments::create(&db, &mirror, payload).await?;
    record_action("payments", "create_payment", Some(payment.id), "Payment recorded");
    Ok((StatusCode::CREATED, Json(payment.into())))
}

pub async fn get_payment(
    Extension(db): Extension<DatabaseConnection>,
    Path(payment_id): Path<i32>,
    Query(query): Query<ViewQuery>,
) -> ClinicResult<Json<PaymentBody>> {
    Ok(Json(payments::get(&db, payment_id, query.view).await?.into()))
}

pub async fn update_payment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(payment_id): Path<i32>,
    Json(payload): Json<PaymentChanges>,
) -> ClinicResult<Json<PaymentBody>> {
    let payment = payments::update(&db, &mirror, payment_id, payload).await?;
    record_action("payments", "update_payment", Some(payment_id), "Payment updated");
    Ok(Json(payment.into()))
}

pub async fn delete_payment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(payment_id): Path<i32>,
) -> ClinicResult<Json<PaymentBody>> {
    let payment = payments::soft_delete(&db, &mirror, payment_id).await?;
    record_action("payments", "deactivate_payment", Some(payment_id), "Payment deactivated");
    Ok(Json(payment.into()))
}

pub async fn restore_payment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(mirror): Extension<Synchronizer>,
    Path(payment_id): Path<i32>,
) -> ClinicResult<Json<PaymentBody>> {
    let payment = payments::restore(&db, &mirror, payment_id).await?;
    record_action("payments", "restore_payment", Some(payment_id), "Payment restored");
    Ok(Json(payment.into()))
}
