//! # 数据库模块
//!
//! 数据库连接、迁移和种子数据管理

use crate::config::{DatabaseConfig, SeedNodeConfig};
use crate::error::{ProxyError, Result};
use crate::upstream::{LATENCY_SENTINEL, normalize_registry_url};
use entity::proxy_nodes;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, Set,
};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{error, info, warn};

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let database_url = config.get_connection_url()?;
    info!(
        "正在连接数据库: {}",
        &database_url[..std::cmp::min(database_url.len(), 50)]
    );

    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库连接失败", e))?;

    info!("数据库连接成功");
    Ok(db)
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> std::result::Result<(), DbErr> {
    info!("开始运行数据库迁移...");

    match ::migration::Migrator::up(db, None).await {
        Ok(()) => {
            info!("数据库迁移完成");
            Ok(())
        }
        Err(e) => {
            error!("数据库迁移失败: {}", e);
            Err(e)
        }
    }
}

/// 检查数据库状态
pub async fn check_database_status(db: &DatabaseConnection) -> std::result::Result<(), DbErr> {
    let status = ::migration::Migrator::get_pending_migrations(db).await?;

    if status.is_empty() {
        info!("所有迁移都已应用");
    } else {
        warn!("有 {} 个待应用的迁移", status.len());
    }

    Ok(())
}

/// 节点表为空时写入配置的种子节点，返回写入数量
pub async fn seed_default_nodes(db: &DatabaseConnection, seeds: &[SeedNodeConfig]) -> Result<usize> {
    if seeds.is_empty() {
        return Ok(0);
    }

    let existing = proxy_nodes::Entity::find().count(db).await?;
    if existing > 0 {
        info!("节点表已有 {} 条记录，跳过种子数据", existing);
        return Ok(0);
    }

    let now = chrono::Utc::now().naive_utc();
    let mut inserted = 0;
    for seed in seeds {
        let node = proxy_nodes::ActiveModel {
            name: Set(seed.name.clone()),
            url: Set(normalize_registry_url(&seed.url)),
            registry_type: Set("dockerhub".to_string()),
            route_prefix: Set(seed.route_prefix.clone()),
            username: Set(seed.username.clone()),
            password: Set(seed.password.clone()),
            enabled: Set(true),
            latency: Set(LATENCY_SENTINEL),
            failure_reason: Set(None),
            last_check: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match node.insert(db).await {
            Ok(model) => {
                inserted += 1;
                info!(node_id = model.id, url = %model.url, "写入种子节点");
            }
            Err(e) => warn!(url = %seed.url, error = %e, "种子节点写入失败，跳过"),
        }
    }

    Ok(inserted)
}
