use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProxyNodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProxyNodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProxyNodes::Name).string().not_null())
                    .col(ColumnDef::new(ProxyNodes::Url).string().not_null())
                    .col(
                        ColumnDef::new(ProxyNodes::RegistryType)
                            .string()
                            .not_null()
                            .default("dockerhub"),
                    )
                    .col(ColumnDef::new(ProxyNodes::RoutePrefix).string())
                    .col(ColumnDef::new(ProxyNodes::Username).string())
                    .col(ColumnDef::new(ProxyNodes::Password).string())
                    .col(
                        ColumnDef::new(ProxyNodes::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProxyNodes::Latency)
                            .double()
                            .not_null()
                            .default(9999.0),
                    )
                    .col(ColumnDef::new(ProxyNodes::FailureReason).text())
                    .col(ColumnDef::new(ProxyNodes::LastCheck).timestamp())
                    .col(
                        ColumnDef::new(ProxyNodes::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProxyNodes::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 每个规范化 URL 只允许一行
        manager
            .create_index(
                Index::create()
                    .name("idx_proxy_nodes_url_unique")
                    .table(ProxyNodes::Table)
                    .col(ProxyNodes::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 选择器按 enabled + latency 排序读取
        manager
            .create_index(
                Index::create()
                    .name("idx_proxy_nodes_enabled_latency")
                    .table(ProxyNodes::Table)
                    .col(ProxyNodes::Enabled)
                    .col(ProxyNodes::Latency)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProxyNodes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProxyNodes {
    Table,
    Id,
    Name,
    Url,
    RegistryType,
    RoutePrefix,
    Username,
    Password,
    Enabled,
    Latency,
    FailureReason,
    LastCheck,
    CreatedAt,
    UpdatedAt,
}
