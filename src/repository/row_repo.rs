// ==========================================
// CMS 参考表数据摄取系统 - 版本化数据行仓储
// ==========================================
// 职责: 按数据源配置维护各自的版本化数据表，行级写入与回读
// 红线: 表名/列名来自配置，写入 SQL 前必须通过标识符白名单校验
// ==========================================

use crate::domain::row::{CellValue, DataRow, RowRef};
use crate::domain::source::{DataSourceConfig, DataType};
use crate::domain::report::{IssueKind, ValidationIssue};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Value;
use rusqlite::{params, Connection, ToSql};
use std::sync::{Arc, Mutex};

/// 校验 SQL 标识符（配置驱动的表名/列名只允许小写字母数字下划线）
fn validate_identifier(name: &str) -> RepositoryResult<()> {
    let ok = !name.is_empty()
        && name.chars().next().map(|c| c.is_ascii_lowercase()).unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(RepositoryError::InvalidIdentifier(name.to_string()))
    }
}

/// 数据库值 → 按声明类型还原的单元格值
fn cell_from_sql(value: Value, data_type: DataType) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Integer(n) => match data_type {
            DataType::Boolean => CellValue::Boolean(n != 0),
            DataType::Numeric => CellValue::Numeric(n as f64),
            _ => CellValue::Integer(n),
        },
        Value::Real(f) => CellValue::Numeric(f),
        Value::Text(s) => match data_type {
            DataType::Date => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(CellValue::Date)
                .unwrap_or(CellValue::Text(s)),
            _ => CellValue::Text(s),
        },
        Value::Blob(_) => CellValue::Null,
    }
}

// ==========================================
// DataRowRepository - 数据行仓储
// ==========================================
pub struct DataRowRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DataRowRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn validated_columns(config: &DataSourceConfig) -> RepositoryResult<Vec<&str>> {
        validate_identifier(&config.target_table)?;
        let mut names = Vec::with_capacity(config.columns.len());
        for column in &config.columns {
            validate_identifier(&column.internal_name)?;
            names.push(column.internal_name.as_str());
        }
        Ok(names)
    }

    /// 按配置创建该源的版本化数据表（幂等）
    ///
    /// 删除版本元数据时数据行随外键级联删除。
    pub fn ensure_table(&self, config: &DataSourceConfig) -> RepositoryResult<()> {
        Self::validated_columns(config)?;

        let column_defs: Vec<String> = config
            .columns
            .iter()
            .map(|c| format!("{} {}", c.internal_name, c.data_type.sqlite_type()))
            .collect();

        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                data_version_id INTEGER NOT NULL
                    REFERENCES data_versions(id) ON DELETE CASCADE,
                part_index INTEGER NOT NULL DEFAULT 1,
                {columns}
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_version
                ON {table}(data_version_id);"#,
            table = config.target_table,
            columns = column_defs.join(",\n                "),
        );

        let conn = self.get_conn()?;
        conn.execute_batch(&ddl)?;
        Ok(())
    }

    /// 整体替换某版本某分片的数据行（重传幂等的关键）
    ///
    /// 单事务: 先删旧分片行，再逐行插入。单行插入失败计入问题继续，
    /// 不使整个分片回滚。返回 (成功行数, 行级问题)。
    pub fn replace_part_rows(
        &self,
        config: &DataSourceConfig,
        version_id: i64,
        part_index: i64,
        rows: &[DataRow],
    ) -> RepositoryResult<(usize, Vec<ValidationIssue>)> {
        let names = Self::validated_columns(config)?;

        let placeholders: Vec<&str> = std::iter::repeat("?")
            .take(names.len() + 2)
            .collect();
        let insert_sql = format!(
            "INSERT INTO {} (data_version_id, part_index, {}) VALUES ({})",
            config.target_table,
            names.join(", "),
            placeholders.join(", "),
        );

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "DELETE FROM {} WHERE data_version_id = ? AND part_index = ?",
                config.target_table
            ),
            params![version_id, part_index],
        )?;

        let mut inserted = 0usize;
        let mut issues = Vec::new();
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for row in rows {
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(names.len() + 2);
                values.push(&version_id);
                values.push(&part_index);
                for name in &names {
                    values.push(row.get(name) as &dyn ToSql);
                }

                match stmt.execute(values.as_slice()) {
                    Ok(_) => inserted += 1,
                    Err(e) => issues.push(ValidationIssue {
                        row_ref: Some(row.row_ref.clone()),
                        column: None,
                        kind: IssueKind::RowInsertFailed,
                        message: format!("行写入失败: {}", e),
                    }),
                }
            }
        }

        tx.commit()?;
        Ok((inserted, issues))
    }

    /// 某版本的数据行总数
    pub fn count_rows(&self, config: &DataSourceConfig, version_id: i64) -> RepositoryResult<i64> {
        validate_identifier(&config.target_table)?;
        let conn = self.get_conn()?;
        let count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE data_version_id = ?",
                config.target_table
            ),
            params![version_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 读取某版本全部行的唯一键元组（跨分片查重用）
    ///
    /// SQLite 的 UNIQUE 索引视 NULL 互不相等，含 NULL 键分量的重复
    /// 只能在这里（Rust 侧指纹比较）发现。
    pub fn fetch_key_tuples(
        &self,
        config: &DataSourceConfig,
        version_id: i64,
    ) -> RepositoryResult<Vec<(Vec<CellValue>, i64, RowRef)>> {
        validate_identifier(&config.target_table)?;
        let mut key_types = Vec::with_capacity(config.unique_keys.len());
        for key in &config.unique_keys {
            validate_identifier(key)?;
            let column = config.column(key).ok_or_else(|| {
                RepositoryError::ValidationError(format!(
                    "唯一键 {} 不在 {} 的规范列中",
                    key, config.source_code
                ))
            })?;
            key_types.push(column.data_type);
        }

        let sql = format!(
            "SELECT {}, part_index, id FROM {} WHERE data_version_id = ? ORDER BY part_index, id",
            config.unique_keys.join(", "),
            config.target_table,
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let key_count = config.unique_keys.len();

        let tuples = stmt
            .query_map(params![version_id], |row| {
                let mut values = Vec::with_capacity(key_count);
                for (idx, data_type) in key_types.iter().enumerate() {
                    let raw: Value = row.get(idx)?;
                    values.push(cell_from_sql(raw, *data_type));
                }
                let part_index: i64 = row.get(key_count)?;
                let row_id: i64 = row.get(key_count + 1)?;
                Ok((values, part_index, row_id))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tuples
            .into_iter()
            .map(|(values, part_index, row_id)| {
                // 回读阶段没有源文件行号，用表内 rowid 做追溯
                let row_ref = RowRef {
                    file_name: config.target_table.clone(),
                    line_number: row_id as usize,
                };
                (values, part_index, row_ref)
            })
            .collect())
    }

    /// 回读某版本的全部类型化行（校验与下游消费用）
    pub fn fetch_rows(
        &self,
        config: &DataSourceConfig,
        version_id: i64,
    ) -> RepositoryResult<Vec<DataRow>> {
        let names = Self::validated_columns(config)?;

        let sql = format!(
            "SELECT {}, id FROM {} WHERE data_version_id = ? ORDER BY part_index, id",
            names.join(", "),
            config.target_table,
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let types: Vec<DataType> = config.columns.iter().map(|c| c.data_type).collect();

        let rows = stmt
            .query_map(params![version_id], |row| {
                let mut data_row = DataRow::new(RowRef {
                    file_name: config.target_table.clone(),
                    line_number: row.get::<_, i64>(names.len())? as usize,
                });
                for (idx, name) in names.iter().enumerate() {
                    let raw: Value = row.get(idx)?;
                    data_row.set(name, cell_from_sql(raw, types[idx]));
                }
                Ok(data_row)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
