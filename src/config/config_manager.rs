// ==========================================
// CMS 参考表数据摄取系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::ingest_config_trait::IngestConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    /// 等待剩余分片的最长时间（秒）
    pub const MAX_PART_WAIT_SECS: &str = "ingest.max_part_wait_secs";
    /// 表头行探测扫描窗口
    pub const HEADER_SCAN_ROWS: &str = "ingest.header_scan_rows";
    /// 行数对比告警比例
    pub const ROW_COUNT_WARN_RATIO: &str = "ingest.row_count_warn_ratio";
}

// 默认值（config_kv 未配置时生效）
const DEFAULT_MAX_PART_WAIT_SECS: i64 = 3_600;
const DEFAULT_HEADER_SCAN_ROWS: usize = 15;
const DEFAULT_ROW_COUNT_WARN_RATIO: f64 = 0.5;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值（运维与测试用）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value, updated_at)
               VALUES ('global', ?1, ?2, datetime('now'))
               ON CONFLICT (scope_id, key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = datetime('now')"#,
            params![key, value],
        )?;

        Ok(())
    }

    fn get_i64_or(&self, key: &str, default: i64) -> Result<i64, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => Ok(raw
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("配置 {} 非整数: {}", key, e))?),
            None => Ok(default),
        }
    }

    fn get_f64_or(&self, key: &str, default: f64) -> Result<f64, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => Ok(raw
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("配置 {} 非数值: {}", key, e))?),
            None => Ok(default),
        }
    }
}

#[async_trait]
impl IngestConfigReader for ConfigManager {
    async fn get_max_part_wait_secs(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or(config_keys::MAX_PART_WAIT_SECS, DEFAULT_MAX_PART_WAIT_SECS)
    }

    async fn get_header_scan_rows(&self) -> Result<usize, Box<dyn Error>> {
        let n = self.get_i64_or(
            config_keys::HEADER_SCAN_ROWS,
            DEFAULT_HEADER_SCAN_ROWS as i64,
        )?;
        Ok(n.max(1) as usize)
    }

    async fn get_row_count_warn_ratio(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64_or(
            config_keys::ROW_COUNT_WARN_RATIO,
            DEFAULT_ROW_COUNT_WARN_RATIO,
        )
    }
}
