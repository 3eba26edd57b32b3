//! # 测试辅助函数

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

/// 创建已完成迁移的内存数据库
///
/// 连接池只保留一个连接，否则 `sqlite::memory:` 的每个连接都是独立的空库。
pub async fn create_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("连接内存数据库失败");
    migration::Migrator::up(&db, None)
        .await
        .expect("执行迁移失败");
    db
}
