use sea_orm_migration::prelude::*;

/// Every soft-deletable table carries the same pair of lifecycle columns; the
/// CHECK keeps `active` and `deleted_at` in agreement at the storage level.
const LIFECYCLE_CHECK: &str =
    "(active AND deleted_at IS NULL) OR (NOT active AND deleted_at IS NOT NULL)";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Owners
        manager
            .create_table(
                Table::create()
                    .table(Owners::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Owners::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Owners::MirrorId).string().not_null().unique_key())
                    .col(ColumnDef::new(Owners::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Owners::Phone).string_len(20))
                    .col(ColumnDef::new(Owners::Email).string())
                    .col(ColumnDef::new(Owners::Address).text())
                    .col(ColumnDef::new(Owners::RegisteredAt).date_time().not_null())
                    .col(ColumnDef::new(Owners::Active).boolean().default(true).not_null())
                    .col(ColumnDef::new(Owners::DeletedAt).date_time())
                    .check(Expr::cust(LIFECYCLE_CHECK))
                    .to_owned(),
            )
            .await?;

        // Veterinarians
        manager
            .create_table(
                Table::create()
                    .table(Veterinarians::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Veterinarians::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Veterinarians::MirrorId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Veterinarians::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Veterinarians::Specialty).string_len(100))
                    .col(ColumnDef::new(Veterinarians::Phone).string_len(20))
                    .col(ColumnDef::new(Veterinarians::Email).string())
                    .col(
                        ColumnDef::new(Veterinarians::Active)
                            .boolean()
                            .default(true)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Veterinarians::DeletedAt).date_time())
                    .check(Expr::cust(LIFECYCLE_CHECK))
                    .to_owned(),
            )
            .await?;

        // Pets
        manager
            .create_table(
                Table::create()
                    .table(Pets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Pets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Pets::MirrorId).string().not_null().unique_key())
                    .col(ColumnDef::new(Pets::OwnerId).integer().not_null())
                    .col(ColumnDef::new(Pets::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Pets::Species).string_len(50))
                    .col(ColumnDef::new(Pets::Breed).string_len(50))
                    .col(ColumnDef::new(Pets::BirthDate).date())
                    .col(ColumnDef::new(Pets::RegisteredAt).date_time().not_null())
                    .col(ColumnDef::new(Pets::Active).boolean().default(true).not_null())
                    .col(ColumnDef::new(Pets::DeletedAt).date_time())
                    .check(Expr::cust(LIFECYCLE_CHECK))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-pet-owner_id")
                            .from(Pets::Table, Pets::OwnerId)
                            .to(Owners::Table, Owners::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Visits
        manager
            .create_table(
                Table::create()
                    .table(Visits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Visits::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Visits::MirrorId).string().not_null().unique_key())
                    .col(ColumnDef::new(Visits::PetId).integer().not_null())
                    .col(ColumnDef::new(Visits::VeterinarianId).integer())
                    .col(ColumnDef::new(Visits::Reason).text().not_null())
                    .col(ColumnDef::new(Visits::Diagnosis).text())
                    .col(ColumnDef::new(Visits::Treatment).text())
                    .col(ColumnDef::new(Visits::Notes).text())
                    .col(
                        ColumnDef::new(Visits::CostCents)
                            .big_integer()
                            .default(0)
                            .not_null()
                            .check(Expr::col(Visits::CostCents).gte(0)),
                    )
                    .col(ColumnDef::new(Visits::VisitedAt).date_time().not_null())
                    .col(ColumnDef::new(Visits::Active).boolean().default(true).not_null())
                    .col(ColumnDef::new(Visits::DeletedAt).date_time())
                    .check(Expr::cust(LIFECYCLE_CHECK))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-visit-pet_id")
                            .from(Visits::Table, Visits::PetId)
                            .to(Pets::Table, Pets::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-visit-veterinarian_id")
                            .from(Visits::Table, Visits::VeterinarianId)
                            .to(Veterinarians::Table, Veterinarians::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Payments
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payments::MirrorId).string().not_null().unique_key())
                    .col(ColumnDef::new(Payments::VisitId).integer().not_null())
                    .col(
                        ColumnDef::new(Payments::AmountCents)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(Payments::AmountCents).gte(0)),
                    )
                    .col(ColumnDef::new(Payments::Method).string_len(20).not_null())
                    .col(
                        ColumnDef::new(Payments::Status)
                            .string_len(20)
                            .default("paid")
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::PaidAt).date_time().not_null())
                    .col(ColumnDef::new(Payments::Active).boolean().default(true).not_null())
                    .col(ColumnDef::new(Payments::DeletedAt).date_time())
                    .check(Expr::cust(LIFECYCLE_CHECK))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-payment-visit_id")
                            .from(Payments::Table, Payments::VisitId)
                            .to(Visits::Table, Visits::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Listing indexes: every default query filters on `active`
        manager
            .create_index(
                Index::create()
                    .name("idx_owners_active_name")
                    .table(Owners::Table)
                    .col(Owners::Active)
                    .col(Owners::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pets_owner_id_active")
                    .table(Pets::Table)
                    .col(Pets::OwnerId)
                    .col(Pets::Active)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_visits_pet_id_active")
                    .table(Visits::Table)
                    .col(Visits::PetId)
                    .col(Visits::Active)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payments_visit_id_active")
                    .table(Payments::Table)
                    .col(Payments::VisitId)
                    .col(Payments::Active)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Visits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Pets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Veterinarians::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Owners::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Owners {
    Table,
    Id,
    MirrorId,
    Name,
    Phone,
    Email,
    Address,
    RegisteredAt,
    Active,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Veterinarians {
    Table,
    Id,
    MirrorId,
    Name,
    Specialty,
    Phone,
    Email,
    Active,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Pets {
    Table,
    Id,
    MirrorId,
    OwnerId,
    Name,
    Species,
    Breed,
    BirthDate,
    RegisteredAt,
    Active,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Visits {
    Table,
    Id,
    MirrorId,
    PetId,
    VeterinarianId,
    Reason,
    Diagnosis,
    Treatment,
    Notes,
    CostCents,
    VisitedAt,
    Active,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    MirrorId,
    VisitId,
    AmountCents,
    Method,
    Status,
    PaidAt,
    Active,
    DeletedAt,
}
