// ==========================================
// CMS 参考表数据摄取系统 - 摄取事件日志仓储
// ==========================================
// 职责: ingestion_logs 表读写，版本级摄取事件留痕
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// 持久化的摄取事件
#[derive(Debug, Clone)]
pub struct IngestLogEntry {
    pub log_level: String,
    pub message: String,
    pub details: Option<String>,
}

// ==========================================
// IngestLogRepository - 事件日志仓储
// ==========================================
pub struct IngestLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl IngestLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入一条摄取事件
    pub fn insert(
        &self,
        version_id: i64,
        level: &str,
        message: &str,
        details: Option<&serde_json::Value>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO ingestion_logs (data_version_id, log_level, message, details)
               VALUES (?, ?, ?, ?)"#,
            params![
                version_id,
                level,
                message,
                details.map(|d| d.to_string()),
            ],
        )?;
        Ok(())
    }

    /// 按版本查询事件，旧的在前
    pub fn list_for_version(&self, version_id: i64) -> RepositoryResult<Vec<IngestLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT log_level, message, details
               FROM ingestion_logs
               WHERE data_version_id = ?
               ORDER BY id"#,
        )?;

        let entries = stmt
            .query_map(params![version_id], |row| {
                Ok(IngestLogEntry {
                    log_level: row.get(0)?,
                    message: row.get(1)?,
                    details: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
