use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_stock_tables::Migration),
            Box::new(m20240101_000002_create_stock_history_table::Migration),
            Box::new(m20240101_000003_create_sales_tables::Migration),
            Box::new(m20240101_000004_create_orders_tables::Migration),
            Box::new(m20240101_000005_create_returns_tables::Migration),
            Box::new(m20240101_000006_create_number_sequences_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_stock_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockRecords::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockRecords::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockRecords::CurrentStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::DamagedStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::MinStockLevel)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::MaxStockLevel)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockRecords::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(StockRecords::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockRecords::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One record per (product, branch)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_product_branch")
                        .table(StockRecords::Table)
                        .col(StockRecords::ProductId)
                        .col(StockRecords::BranchId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_branch_id")
                        .table(StockRecords::Table)
                        .col(StockRecords::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::StockRecordId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockMovements::Reference).string().not_null())
                        .col(ColumnDef::new(StockMovements::Actor).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_record_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::StockRecordId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockRecords {
        Table,
        Id,
        ProductId,
        BranchId,
        CurrentStock,
        DamagedStock,
        MinStockLevel,
        MaxStockLevel,
        CreatedBy,
        UpdatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum StockMovements {
        Table,
        Id,
        StockRecordId,
        MovementType,
        Quantity,
        Reference,
        Actor,
        CreatedAt,
    }
}

mod m20240101_000002_create_stock_history_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_history_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockHistory::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockHistory::BranchId).uuid().not_null())
                        .col(ColumnDef::new(StockHistory::Action).string().not_null())
                        .col(ColumnDef::new(StockHistory::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockHistory::Reference).string().not_null())
                        .col(ColumnDef::new(StockHistory::Actor).uuid().not_null())
                        .col(ColumnDef::new(StockHistory::Notes).string().null())
                        .col(
                            ColumnDef::new(StockHistory::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_history_product_branch")
                        .table(StockHistory::Table)
                        .col(StockHistory::ProductId)
                        .col(StockHistory::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_history_created_at")
                        .table(StockHistory::Table)
                        .col(StockHistory::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_history_action")
                        .table(StockHistory::Table)
                        .col(StockHistory::Action)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockHistory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockHistory {
        Table,
        Id,
        ProductId,
        BranchId,
        Action,
        Quantity,
        Reference,
        Actor,
        Notes,
        CreatedAt,
    }
}

mod m20240101_000003_create_sales_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sales::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Sales::SaleNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Sales::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Sales::Status).string().not_null())
                        .col(ColumnDef::new(Sales::PaymentMethod).string().not_null())
                        .col(
                            ColumnDef::new(Sales::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Sales::CustomerName).string().null())
                        .col(ColumnDef::new(Sales::CustomerPhone).string().null())
                        .col(ColumnDef::new(Sales::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(Sales::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Sales::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_branch_id")
                        .table(Sales::Table)
                        .col(Sales::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_created_at")
                        .table(Sales::Table)
                        .col(Sales::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaleItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SaleItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(SaleItems::SaleId).uuid().not_null())
                        .col(ColumnDef::new(SaleItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SaleItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(SaleItems::UnitPrice).decimal().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sale_items_sale_id")
                        .table(SaleItems::Table)
                        .col(SaleItems::SaleId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaleItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sales::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Sales {
        Table,
        Id,
        SaleNumber,
        BranchId,
        Status,
        PaymentMethod,
        TotalAmount,
        CustomerName,
        CustomerPhone,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum SaleItems {
        Table,
        Id,
        SaleId,
        ProductId,
        Quantity,
        UnitPrice,
    }
}

mod m20240101_000004_create_orders_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::DeliveredAt).timestamp().null())
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_branch_id")
                        .table(Orders::Table)
                        .col(Orders::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).decimal().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        BranchId,
        Status,
        TotalAmount,
        DeliveredAt,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitPrice,
    }
}

mod m20240101_000005_create_returns_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_returns_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Returns::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Returns::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Returns::ReturnNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Returns::SourceKind).string().not_null())
                        .col(ColumnDef::new(Returns::OrderId).uuid().null())
                        .col(ColumnDef::new(Returns::SaleId).uuid().null())
                        .col(ColumnDef::new(Returns::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Returns::Status).string().not_null())
                        .col(ColumnDef::new(Returns::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(Returns::ReviewedBy).uuid().null())
                        .col(ColumnDef::new(Returns::ReviewNotes).string().null())
                        .col(ColumnDef::new(Returns::ReviewedAt).timestamp().null())
                        .col(ColumnDef::new(Returns::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Returns::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_returns_branch_id")
                        .table(Returns::Table)
                        .col(Returns::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_returns_status")
                        .table(Returns::Table)
                        .col(Returns::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnItems::ReturnId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(ReturnItems::Price).decimal().not_null())
                        .col(ColumnDef::new(ReturnItems::Reason).string().not_null())
                        .col(ColumnDef::new(ReturnItems::Status).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_items_return_id")
                        .table(ReturnItems::Table)
                        .col(ReturnItems::ReturnId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnStatusHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnStatusHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnStatusHistory::ReturnId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnStatusHistory::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnStatusHistory::ChangedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnStatusHistory::Note).string().null())
                        .col(
                            ColumnDef::new(ReturnStatusHistory::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_status_history_return_id")
                        .table(ReturnStatusHistory::Table)
                        .col(ReturnStatusHistory::ReturnId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReturnStatusHistory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReturnItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Returns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Returns {
        Table,
        Id,
        ReturnNumber,
        SourceKind,
        OrderId,
        SaleId,
        BranchId,
        Status,
        CreatedBy,
        ReviewedBy,
        ReviewNotes,
        ReviewedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ReturnItems {
        Table,
        Id,
        ReturnId,
        ProductId,
        Quantity,
        Price,
        Reason,
        Status,
    }

    #[derive(DeriveIden)]
    pub(super) enum ReturnStatusHistory {
        Table,
        Id,
        ReturnId,
        Status,
        ChangedBy,
        Note,
        CreatedAt,
    }
}

mod m20240101_000006_create_number_sequences_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_number_sequences_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(NumberSequences::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(NumberSequences::Prefix).string().not_null())
                        .col(ColumnDef::new(NumberSequences::Day).string().not_null())
                        .col(
                            ColumnDef::new(NumberSequences::Counter)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .primary_key(
                            Index::create()
                                .col(NumberSequences::Prefix)
                                .col(NumberSequences::Day),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(NumberSequences::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum NumberSequences {
        Table,
        Prefix,
        Day,
        Counter,
    }
}
