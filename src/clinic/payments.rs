use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, QueryOrder, Set, TransactionTrait};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::validation;
use crate::entities::payment::{self, PaymentMethod, DEFAULT_STATUS};
use crate::entities::visit;
use crate::error::ClinicResult;
use crate::lifecycle::{self, Lifecycle, RecordKind, RecordView};
use crate::mirror::{self, MirrorEvent, ParentRef, Synchronizer};

#[derive(Debug, Deserialize)]
pub struct NewPayment {
    pub visit_id: i32,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentChanges {
    pub amount: Option<Decimal>,
    pub method: Option<PaymentMethod>,
    pub status: Option<String>,
}

pub fn remote_row(payment: &payment::Model) -> Value {
    json!({
        "amount": validation::from_cents(payment.amount_cents),
        "method": payment.method.as_str(),
        "status": payment.status,
        "paid_at": payment.paid_at,
        "active": payment.active,
    })
}

fn visit_link(visit_key: &str) -> ParentRef {
    ParentRef {
        column: "visit_id",
        kind: RecordKind::Visit,
        key: visit_key.to_string(),
        required: true,
    }
}

pub fn creation_event(payment: &payment::Model, visit_key: &str) -> MirrorEvent {
    MirrorEvent::Create {
        kind: RecordKind::Payment,
        key: payment.mirror_id.clone(),
        row: remote_row(payment),
        parents: vec![visit_link(visit_key)],
    }
}

fn status(raw: Option<String>) -> ClinicResult<String> {
    Ok(validation::optional_within("status", raw, validation::STATUS_MAX)?
        .unwrap_or_else(|| DEFAULT_STATUS.to_string()))
}

/// Records a payment against an active visit.
pub async fn create(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    input: NewPayment,
) -> ClinicResult<payment::Model> {
    let amount_cents = validation::to_cents("amount", input.amount)?;
    let status = status(input.status)?;
    let (active, deleted_at) = Lifecycle::Active.columns();

    let txn = db.begin().await?;
    let visit =
        lifecycle::find_in::<visit::Entity, _>(&txn, input.visit_id, RecordView::Active).await?;

    let new_payment = payment::ActiveModel {
        mirror_id: Set(mirror::new_mirror_key()),
        visit_id: Set(visit.id),
        amount_cents: Set(amount_cents),
        method: Set(input.method),
        status: Set(status),
        paid_at: Set(chrono::Utc::now().naive_utc()),
        active: Set(active),
        deleted_at: Set(deleted_at),
        ..Default::default()
    };

    let payment = new_payment.insert(&txn).await?;
    txn.commit().await?;

    info!(
        "Recorded {} payment {} of {} for visit {}",
        payment.method.as_str(),
        payment.id,
        validation::from_cents(payment.amount_cents),
        visit.id
    );
    crate::metrics::record_created(RecordKind::Payment);

    mirror.publish(creation_event(&payment, &visit.mirror_id));
    Ok(payment)
}

pub async fn update(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
    changes: PaymentChanges,
) -> ClinicResult<payment::Model> {
    let current = lifecycle::find_in::<payment::Entity, _>(db, id, RecordView::Active).await?;

    let mut active_payment: payment::ActiveModel = current.into();
    if let Some(amount) = changes.amount {
        active_payment.amount_cents = Set(validation::to_cents("amount", amount)?);
    }
    if let Some(method) = changes.method {
        active_payment.method = Set(method);
    }
    if changes.status.is_some() {
        active_payment.status = Set(status(changes.status)?);
    }

    let payment = active_payment.update(db).await?;

    // The visit link never changes after creation.
    mirror.publish(MirrorEvent::Update {
        kind: RecordKind::Payment,
        key: payment.mirror_id.clone(),
        row: remote_row(&payment),
        parents: Vec::new(),
    });
    Ok(payment)
}

pub async fn soft_delete(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<payment::Model> {
    super::deactivate::<payment::Entity>(db, mirror, id).await
}

/// Refused while the visit is inactive.
pub async fn restore(
    db: &DatabaseConnection,
    mirror: &Synchronizer,
    id: i32,
) -> ClinicResult<payment::Model> {
    super::reactivate_under::<payment::Entity, visit::Entity>(db, mirror, id, |p| p.visit_id)
        .await
}

pub async fn get(
    db: &DatabaseConnection,
    id: i32,
    view: RecordView,
) -> ClinicResult<payment::Model> {
    lifecycle::find_in::<payment::Entity, _>(db, id, view).await
}

/// All payments, newest first.
pub async fn list(db: &DatabaseConnection, view: RecordView) -> ClinicResult<Vec<payment::Model>> {
    Ok(lifecycle::scoped::<payment::Entity>(view)
        .order_by_desc(payment::Column::PaidAt)
        .order_by_desc(payment::Column::Id)
        .all(db)
        .await?)
}

pub async fn purge(db: &DatabaseConnection, id: i32) -> ClinicResult<()> {
    super::purge::<payment::Entity>(db, id).await
}
