//! # 数据库配置

use crate::error::{ProxyError, Result};
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库URL
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/registry_proxy.db".to_string(),
            max_connections: 10,
            connect_timeout: 30,
        }
    }
}

impl DatabaseConfig {
    /// 确保数据库路径存在（仅对SQLite文件数据库）
    pub fn ensure_database_path(&self) -> Result<()> {
        let Some(db_path) = self.sqlite_file_path() else {
            return Ok(());
        };

        let missing_parent = db_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty() && !parent.exists());
        if let Some(parent) = missing_parent {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProxyError::config_with_source(
                    format!("无法创建数据库目录: {}", parent.display()),
                    e,
                )
            })?;

            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "create_db_dir",
                &format!("创建数据库目录: {}", parent.display())
            );
        }

        if !db_path.exists() {
            std::fs::File::create(db_path).map_err(|e| {
                ProxyError::config_with_source(
                    format!("无法创建数据库文件: {}", db_path.display()),
                    e,
                )
            })?;
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "create_db_file",
                &format!("数据库文件已创建: {}", db_path.display())
            );
        }

        Ok(())
    }

    /// 获取准备好的数据库连接字符串
    pub fn get_connection_url(&self) -> Result<String> {
        self.ensure_database_path()?;
        Ok(self.url.clone())
    }

    /// 检查是否为内存数据库
    #[must_use]
    pub fn is_memory_database(&self) -> bool {
        self.url.contains(":memory:")
    }

    /// SQLite 文件路径，内存库和非 SQLite 返回 None
    fn sqlite_file_path(&self) -> Option<&Path> {
        if self.is_memory_database() {
            return None;
        }
        let rest = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or(rest);
        (!path.is_empty()).then(|| Path::new(path))
    }
}
