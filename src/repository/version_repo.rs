// ==========================================
// CMS 参考表数据摄取系统 - 数据版本仓储
// ==========================================
// 职责: data_versions / data_version_parts 两表的读写与晋升事务
// 红线: is_current 切换必须在单事务内完成；任一 (源,变体) 永不出现 0 或 2 个 current
// ==========================================

use crate::domain::version::{DataVersion, VersionKey, VersionPart, VersionStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use std::sync::{Arc, Mutex};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT).ok()
}

// ==========================================
// DataVersionRepository - 版本仓储
// ==========================================
pub struct DataVersionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DataVersionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按逻辑标识查询版本（含已接收分片序号集合）
    pub fn find(&self, source_id: i64, key: &VersionKey) -> RepositoryResult<Option<DataVersion>> {
        let conn = self.get_conn()?;
        Self::find_in(&conn, source_id, key)
    }

    fn find_in(
        conn: &Connection,
        source_id: i64,
        key: &VersionKey,
    ) -> RepositoryResult<Option<DataVersion>> {
        let row = conn.query_row(
            r#"SELECT id, status, record_count, is_current, part_count_expected,
                      error_message, first_part_at, imported_at, created_at
               FROM data_versions
               WHERE source_id = ? AND variant = ? AND version_label = ?"#,
            params![source_id, key.variant_db(), &key.version_label],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        );

        let (
            id,
            status,
            record_count,
            is_current,
            part_count_expected,
            error_message,
            first_part_at,
            imported_at,
            created_at,
        ) = match row {
            Ok(values) => values,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stmt = conn.prepare(
            "SELECT part_index FROM data_version_parts WHERE data_version_id = ? ORDER BY part_index",
        )?;
        let parts_received = stmt
            .query_map(params![id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(Some(DataVersion {
            id,
            key: key.clone(),
            status: VersionStatus::from_db_str(&status),
            record_count,
            is_current: is_current != 0,
            part_count_expected,
            parts_received,
            error_message,
            first_part_at: first_part_at.as_deref().and_then(parse_datetime),
            imported_at: imported_at.as_deref().and_then(parse_datetime),
            created_at: parse_datetime(&created_at).unwrap_or_else(|| Utc::now().naive_utc()),
        }))
    }

    /// 创建 PENDING 版本（首个分片到达时）
    ///
    /// part_count_expected 由首个分片的申报值固定。
    pub fn create_pending(
        &self,
        source_id: i64,
        key: &VersionKey,
        part_count_expected: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO data_versions (
                source_id, variant, version_label, status,
                part_count_expected, first_part_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                source_id,
                key.variant_db(),
                &key.version_label,
                VersionStatus::Pending.to_db_str(),
                part_count_expected,
                format_datetime(now),
                format_datetime(now),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 置为 PROCESSING
    pub fn mark_processing(&self, version_id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE data_versions SET status = ? WHERE id = ?",
            params![VersionStatus::Processing.to_db_str(), version_id],
        )?;
        Ok(())
    }

    /// 置为 FAILED 并记录原因
    pub fn mark_failed(&self, version_id: i64, error_message: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE data_versions SET status = ?, error_message = ? WHERE id = ?",
            params![VersionStatus::Failed.to_db_str(), error_message, version_id],
        )?;
        Ok(())
    }

    /// 置为 COMPLETED 并写入最终行数
    pub fn mark_completed(
        &self,
        version_id: i64,
        record_count: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE data_versions SET status = ?, record_count = ?, imported_at = ? WHERE id = ?",
            params![
                VersionStatus::Completed.to_db_str(),
                record_count,
                format_datetime(now),
                version_id
            ],
        )?;
        Ok(())
    }

    /// 写入/重写单个分片的元数据（重传同序号分片即覆盖）
    pub fn upsert_part(&self, version_id: i64, part: &VersionPart) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO data_version_parts (
                data_version_id, part_index, file_name, file_hash,
                file_size_bytes, record_count, imported_at
            ) VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT (data_version_id, part_index) DO UPDATE SET
                file_name = excluded.file_name,
                file_hash = excluded.file_hash,
                file_size_bytes = excluded.file_size_bytes,
                record_count = excluded.record_count,
                imported_at = datetime('now')"#,
            params![
                version_id,
                part.part_index,
                &part.file_name,
                &part.file_hash,
                part.file_size_bytes,
                part.record_count,
            ],
        )?;
        Ok(())
    }

    /// 晋升版本为 current（同一 (源,变体) 的旧 current 同事务内退位）
    ///
    /// # 红线
    /// - 必须在事务中完成，读方只能看到旧 current 或新 current
    /// - 事务内校验 status=COMPLETED，未完成版本拒绝晋升
    pub fn promote(&self, source_id: i64, key: &VersionKey) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let (version_id, status) = Self::require_version(&tx, source_id, key)?;

        if status != VersionStatus::Completed {
            return Err(RepositoryError::VersionNotCompleted {
                version_label: key.version_label.clone(),
                status: status.to_db_str().to_string(),
            });
        }

        // 1. 旧 current 退位
        tx.execute(
            "UPDATE data_versions SET is_current = 0 WHERE source_id = ? AND variant = ? AND is_current = 1",
            params![source_id, key.variant_db()],
        )?;

        // 2. 新版本上位
        tx.execute(
            "UPDATE data_versions SET is_current = 1 WHERE id = ?",
            params![version_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn require_version(
        tx: &Transaction,
        source_id: i64,
        key: &VersionKey,
    ) -> RepositoryResult<(i64, VersionStatus)> {
        match tx.query_row(
            "SELECT id, status FROM data_versions WHERE source_id = ? AND variant = ? AND version_label = ?",
            params![source_id, key.variant_db(), &key.version_label],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        ) {
            Ok((id, status)) => Ok((id, VersionStatus::from_db_str(&status))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
                entity: "DataVersion".to_string(),
                id: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询当前 current 版本
    pub fn find_current(
        &self,
        source_id: i64,
        source_code: &str,
        variant: Option<&str>,
    ) -> RepositoryResult<Option<DataVersion>> {
        let conn = self.get_conn()?;

        let label: Option<String> = match conn.query_row(
            "SELECT version_label FROM data_versions WHERE source_id = ? AND variant = ? AND is_current = 1",
            params![source_id, variant.unwrap_or("")],
            |row| row.get(0),
        ) {
            Ok(label) => Some(label),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match label {
            Some(label) => {
                let key = VersionKey::new(source_code, variant, &label);
                Self::find_in(&conn, source_id, &key)
            }
            None => Ok(None),
        }
    }

    /// 查询某 (源,变体) 的全部版本元数据，新的在前
    pub fn list(
        &self,
        source_id: i64,
        source_code: &str,
        variant: Option<&str>,
    ) -> RepositoryResult<Vec<DataVersion>> {
        let labels: Vec<String> = {
            let conn = self.get_conn()?;
            let mut stmt = conn.prepare(
                r#"SELECT version_label FROM data_versions
                   WHERE source_id = ? AND variant = ?
                   ORDER BY created_at DESC, id DESC"#,
            )?;
            let rows = stmt
                .query_map(params![source_id, variant.unwrap_or("")], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            rows
        };

        let mut versions = Vec::with_capacity(labels.len());
        for label in labels {
            let key = VersionKey::new(source_code, variant, &label);
            if let Some(version) = self.find(source_id, &key)? {
                versions.push(version);
            }
        }
        Ok(versions)
    }

    /// 上一个已完成版本的行数（行数对比告警用）
    pub fn last_completed_record_count(
        &self,
        source_id: i64,
        variant: Option<&str>,
    ) -> RepositoryResult<Option<i64>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT record_count FROM data_versions
               WHERE source_id = ? AND variant = ? AND status = 'COMPLETED'
               ORDER BY imported_at DESC, id DESC
               LIMIT 1"#,
            params![source_id, variant.unwrap_or("")],
            |row| row.get(0),
        ) {
            Ok(count) => Ok(Some(count)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按文件哈希查重（仅对 COMPLETED 版本；失败版本允许重传同一文件）
    pub fn find_completed_by_file_hash(
        &self,
        source_id: i64,
        file_hash: &str,
    ) -> RepositoryResult<Option<(String, String)>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT v.version_label, COALESCE(p.file_name, '')
               FROM data_versions v
               JOIN data_version_parts p ON p.data_version_id = v.id
               WHERE v.source_id = ? AND p.file_hash = ? AND v.status = 'COMPLETED'
               LIMIT 1"#,
            params![source_id, file_hash],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        ) {
            Ok(found) => Ok(Some(found)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 删除 FAILED 版本（释放 version_label 供重传；级联删除分片与数据行）
    pub fn delete_failed(&self, source_id: i64, key: &VersionKey) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"DELETE FROM data_versions
               WHERE source_id = ? AND variant = ? AND version_label = ? AND status = 'FAILED'"#,
            params![source_id, key.variant_db(), &key.version_label],
        )?;
        Ok(affected > 0)
    }

    /// 将等待分片超时的版本置为 FAILED
    ///
    /// 只影响 PENDING/PROCESSING；已完成版本与其 current 状态不受影响。
    /// 返回被置为 FAILED 的版本 id 列表。
    pub fn fail_expired(
        &self,
        cutoff: NaiveDateTime,
    ) -> RepositoryResult<Vec<i64>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let expired: Vec<i64> = {
            let mut stmt = tx.prepare(
                r#"SELECT id FROM data_versions
                   WHERE status IN ('PENDING', 'PROCESSING') AND first_part_at < ?"#,
            )?;
            let rows = stmt
                .query_map(params![format_datetime(cutoff)], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            rows
        };

        for id in &expired {
            tx.execute(
                "UPDATE data_versions SET status = 'FAILED', error_message = ? WHERE id = ?",
                params!["等待剩余分片超时", id],
            )?;
        }

        tx.commit()?;
        Ok(expired)
    }
}
