use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_items_table::Migration),
            Box::new(m20240101_000002_create_reservations_table::Migration),
            Box::new(m20240101_000003_create_reservation_items_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Items::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::LocationId).uuid().not_null())
                        .col(ColumnDef::new(Items::TotalQuantity).integer().not_null())
                        .col(
                            ColumnDef::new(Items::QuantityInStorage)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Items::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Items::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_items_location_id")
                        .table(Items::Table)
                        .col(Items::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Items {
        Table,
        Id,
        Name,
        LocationId,
        TotalQuantity,
        QuantityInStorage,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_reservations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_reservations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Reservations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Reservations::ReservationNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reservations::RequesterId).uuid().not_null())
                        .col(ColumnDef::new(Reservations::Status).string().not_null())
                        .col(ColumnDef::new(Reservations::PaymentStatus).string().null())
                        .col(
                            ColumnDef::new(Reservations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reservations::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservations_reservation_number")
                        .table(Reservations::Table)
                        .col(Reservations::ReservationNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservations_requester_id")
                        .table(Reservations::Table)
                        .col(Reservations::RequesterId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservations_status")
                        .table(Reservations::Table)
                        .col(Reservations::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Reservations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Reservations {
        Table,
        Id,
        ReservationNumber,
        RequesterId,
        Status,
        PaymentStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_reservation_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_reservation_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReservationItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReservationItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::ReservationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReservationItems::ItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(ReservationItems::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::StartDate)
                                .date()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReservationItems::EndDate).date().not_null())
                        .col(
                            ColumnDef::new(ReservationItems::TotalDays)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationItems::UpdatedAt)
                                .timestamp()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reservation_items_reservation_id")
                                .from(ReservationItems::Table, ReservationItems::ReservationId)
                                .to(Reservations::Table, Reservations::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reservation_items_item_id")
                                .from(ReservationItems::Table, ReservationItems::ItemId)
                                .to(Items::Table, Items::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservation_items_reservation_id")
                        .table(ReservationItems::Table)
                        .col(ReservationItems::ReservationId)
                        .to_owned(),
                )
                .await?;

            // Availability scans filter on item, status, and the date window
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reservation_items_item_status_dates")
                        .table(ReservationItems::Table)
                        .col(ReservationItems::ItemId)
                        .col(ReservationItems::Status)
                        .col(ReservationItems::StartDate)
                        .col(ReservationItems::EndDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReservationItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ReservationItems {
        Table,
        Id,
        ReservationId,
        ItemId,
        LocationId,
        Quantity,
        StartDate,
        EndDate,
        TotalDays,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Reservations {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Items {
        Table,
        Id,
    }
}
