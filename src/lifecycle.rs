//! Soft-delete state shared by every clinical record.
//!
//! Rows store the state as an `active` flag plus a nullable `deleted_at`
//! timestamp. Code never writes those two columns independently: all writes go
//! through [`Lifecycle::columns`] and the conditional [`transition`] update,
//! and the migration adds a CHECK that rejects rows where they disagree.

use std::fmt;

use chrono::NaiveDateTime;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Select,
};
use serde::{Deserialize, Serialize};

use crate::entities::{owner, payment, pet, veterinarian, visit};
use crate::error::{ClinicError, ClinicResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Owner,
    Veterinarian,
    Pet,
    Visit,
    Payment,
}

impl RecordKind {
    /// Parent-first order, the order in which records can be mirrored.
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Owner,
        RecordKind::Veterinarian,
        RecordKind::Pet,
        RecordKind::Visit,
        RecordKind::Payment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Owner => "owner",
            RecordKind::Veterinarian => "veterinarian",
            RecordKind::Pet => "pet",
            RecordKind::Visit => "visit",
            RecordKind::Payment => "payment",
        }
    }

    /// Table name, shared by the local schema and the remote mirror.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Owner => "owners",
            RecordKind::Veterinarian => "veterinarians",
            RecordKind::Pet => "pets",
            RecordKind::Visit => "visits",
            RecordKind::Payment => "payments",
        }
    }

    pub fn from_table(name: &str) -> Option<RecordKind> {
        let name = name.trim().to_ascii_lowercase();
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.table() == name || kind.label() == name)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Inactive { since: NaiveDateTime },
}

impl Lifecycle {
    pub fn inactive_now() -> Self {
        Lifecycle::Inactive {
            since: chrono::Utc::now().naive_utc(),
        }
    }

    /// Reads the stored column pair. Rows where the pair disagrees are
    /// rejected by the table CHECK, so `active` alone decides here.
    pub fn from_columns(active: bool, deleted_at: Option<NaiveDateTime>) -> Self {
        match (active, deleted_at) {
            (true, _) => Lifecycle::Active,
            (false, since) => Lifecycle::Inactive {
                since: since.unwrap_or_default(),
            },
        }
    }

    /// The `(active, deleted_at)` pair to persist.
    pub fn columns(&self) -> (bool, Option<NaiveDateTime>) {
        match self {
            Lifecycle::Active => (true, None),
            Lifecycle::Inactive { since } => (false, Some(*since)),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// Which partition of a table a query looks at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordView {
    #[default]
    Active,
    Inactive,
    All,
}

impl RecordView {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordView::Active => "active",
            RecordView::Inactive => "inactive",
            RecordView::All => "all",
        }
    }
}

/// Entities carrying the `active` / `deleted_at` column pair.
pub trait SoftDelete: EntityTrait {
    const KIND: RecordKind;

    fn id_column() -> Self::Column;
    fn active_column() -> Self::Column;
    fn deleted_at_column() -> Self::Column;
}

/// Row-level accessors the mirror and the API need from every record.
pub trait Tracked {
    fn record_id(&self) -> i32;
    fn mirror_key(&self) -> &str;
    fn lifecycle(&self) -> Lifecycle;
}

macro_rules! soft_deletable {
    ($module:ident, $kind:expr) => {
        impl SoftDelete for $module::Entity {
            const KIND: RecordKind = $kind;

            fn id_column() -> Self::Column {
                $module::Column::Id
            }

            fn active_column() -> Self::Column {
                $module::Column::Active
            }

            fn deleted_at_column() -> Self::Column {
                $module::Column::DeletedAt
            }
        }

        impl Tracked for $module::Model {
            fn record_id(&self) -> i32 {
                self.id
            }

            fn mirror_key(&self) -> &str {
                &self.mirror_id
            }

            fn lifecycle(&self) -> Lifecycle {
                Lifecycle::from_columns(self.active, self.deleted_at)
            }
        }
    };
}

soft_deletable!(owner, RecordKind::Owner);
soft_deletable!(veterinarian, RecordKind::Veterinarian);
soft_deletable!(pet, RecordKind::Pet);
soft_deletable!(visit, RecordKind::Visit);
soft_deletable!(payment, RecordKind::Payment);

/// Base query restricted to one partition.
pub fn scoped<E: SoftDelete>(view: RecordView) -> Select<E> {
    let select = E::find();
    match view {
        RecordView::Active => select.filter(E::active_column().eq(true)),
        RecordView::Inactive => select.filter(E::active_column().eq(false)),
        RecordView::All => select,
    }
}

/// Fetches `id` from the given partition, `NotFound` otherwise.
pub async fn find_in<E, C>(db: &C, id: i32, view: RecordView) -> ClinicResult<E::Model>
where
    E: SoftDelete,
    C: ConnectionTrait,
{
    scoped::<E>(view)
        .filter(E::id_column().eq(id))
        .one(db)
        .await?
        .ok_or(ClinicError::NotFound { kind: E::KIND, id })
}

/// Counts active rows of `E` whose `parent_column` points at `parent_id`.
pub async fn count_active<E, C>(
    db: &C,
    parent_column: E::Column,
    parent_id: i32,
) -> Result<u64, DbErr>
where
    E: SoftDelete,
    E::Model: Sync,
    C: ConnectionTrait,
{
    E::find()
        .filter(parent_column.eq(parent_id))
        .filter(E::active_column().eq(true))
        .count(db)
        .await
}

/// Moves a row into `to`, but only from the opposite state.
///
/// Check and write are one conditional UPDATE, so of two racing soft deletes
/// of the same row exactly one matches and the other gets `NotFound`.
pub async fn transition<E, C>(db: &C, id: i32, to: Lifecycle) -> ClinicResult<E::Model>
where
    E: SoftDelete,
    C: ConnectionTrait,
{
    let (active, deleted_at) = to.columns();

    let res = E::update_many()
        .col_expr(E::active_column(), Expr::value(active))
        .col_expr(E::deleted_at_column(), Expr::value(deleted_at))
        .filter(E::id_column().eq(id))
        .filter(E::active_column().eq(!active))
        .exec(db)
        .await?;

    if res.rows_affected == 0 {
        return Err(ClinicError::NotFound { kind: E::KIND, id });
    }

    find_in::<E, C>(db, id, RecordView::All).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_agree_for_both_states() {
        assert_eq!(Lifecycle::Active.columns(), (true, None));

        let gone = Lifecycle::inactive_now();
        let (active, deleted_at) = gone.columns();
        assert!(!active);
        assert!(deleted_at.is_some());
        assert_eq!(Lifecycle::from_columns(active, deleted_at), gone);
    }

    #[test]
    fn active_flag_wins_when_reading() {
        assert_eq!(Lifecycle::from_columns(true, None), Lifecycle::Active);
        assert!(!Lifecycle::from_columns(false, None).is_active());
    }

    #[test]
    fn record_kind_parses_tables_and_labels() {
        assert_eq!(RecordKind::from_table("owners"), Some(RecordKind::Owner));
        assert_eq!(RecordKind::from_table(" Pet "), Some(RecordKind::Pet));
        assert_eq!(RecordKind::from_table("dueno"), None);
    }

    #[test]
    fn lifecycle_serializes_with_state_tag() {
        let json = serde_json::to_value(Lifecycle::Active).unwrap();
        assert_eq!(json, serde_json::json!({"state": "active"}));

        let view: RecordView = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(view, RecordView::Inactive);
    }
}
