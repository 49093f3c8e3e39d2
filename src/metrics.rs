use sea_orm::{DatabaseConnection, DbErr, PaginatorTrait};

use crate::entities::{owner, payment, pet, veterinarian, visit};
use crate::lifecycle::{scoped, RecordKind, RecordView, SoftDelete};

async fn partition_sizes<E>(db: &DatabaseConnection) -> Result<(u64, u64), DbErr>
where
    E: SoftDelete,
    E::Model: Sync,
{
    let active = scoped::<E>(RecordView::Active).count(db).await?;
    let inactive = scoped::<E>(RecordView::Inactive).count(db).await?;
    Ok((active, inactive))
}

/// Seeds the per-table gauges from the current database contents.
pub async fn init_metrics(db: &DatabaseConnection) {
    let sizes = [
        (RecordKind::Owner, partition_sizes::<owner::Entity>(db).await),
        (
            RecordKind::Veterinarian,
            partition_sizes::<veterinarian::Entity>(db).await,
        ),
        (RecordKind::Pet, partition_sizes::<pet::Entity>(db).await),
        (RecordKind::Visit, partition_sizes::<visit::Entity>(db).await),
        (RecordKind::Payment, partition_sizes::<payment::Entity>(db).await),
    ];

    for (kind, size) in sizes {
        match size {
            Ok((active, inactive)) => {
                let table = kind.table();
                metrics::gauge!("vetclinic_records", "table" => table, "state" => "active")
                    .set(active as f64);
                metrics::gauge!("vetclinic_records", "table" => table, "state" => "inactive")
                    .set(inactive as f64);
                tracing::info!(
                    "Initialized metrics: {} active={} inactive={}",
                    table,
                    active,
                    inactive
                );
            }
            Err(e) => tracing::warn!("Could not count {}: {}", kind.table(), e),
        }
    }
}

/// Moves one record between the active and inactive gauges.
pub fn record_transition(kind: RecordKind, now_active: bool) {
    let (from, to) = if now_active {
        ("inactive", "active")
    } else {
        ("active", "inactive")
    };
    metrics::gauge!("vetclinic_records", "table" => kind.table(), "state" => from).decrement(1.0);
    metrics::gauge!("vetclinic_records", "table" => kind.table(), "state" => to).increment(1.0);
}

pub fn record_created(kind: RecordKind) {
    metrics::counter!("vetclinic_records_created_total", "table" => kind.table()).increment(1);
    metrics::gauge!("vetclinic_records", "table" => kind.table(), "state" => "active")
        .increment(1.0);
}
