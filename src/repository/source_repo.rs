// ==========================================
// CMS 参考表数据摄取系统 - 数据源配置仓储
// ==========================================
// 职责: data_sources / canonical_columns / column_mappings 三表的读写
// 红线: 仓储不含业务逻辑；所有查询参数化
// ==========================================

use crate::domain::source::{
    CanonicalColumn, DataSourceConfig, DataType, DerivedColumnRule, SpecialValueRule,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// SourceConfigRepository - 配置仓储
// ==========================================
pub struct SourceConfigRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SourceConfigRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 保存（upsert）一个数据源配置
    ///
    /// 列与映射整体重写；配置变更是低频运维操作，整写比差量简单可靠。
    pub fn save(&self, config: &DataSourceConfig) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO data_sources (
                source_code, source_name, category, description, target_table,
                update_frequency, display_order, multi_part,
                variants_json, unique_keys_json, derived_rules_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_code) DO UPDATE SET
                source_name = excluded.source_name,
                category = excluded.category,
                description = excluded.description,
                target_table = excluded.target_table,
                update_frequency = excluded.update_frequency,
                display_order = excluded.display_order,
                multi_part = excluded.multi_part,
                variants_json = excluded.variants_json,
                unique_keys_json = excluded.unique_keys_json,
                derived_rules_json = excluded.derived_rules_json,
                updated_at = datetime('now')"#,
            params![
                &config.source_code,
                &config.source_name,
                &config.category,
                &config.description,
                &config.target_table,
                &config.update_frequency,
                &config.display_order,
                config.multi_part as i64,
                serde_json::to_string(&config.variants)?,
                serde_json::to_string(&config.unique_keys)?,
                serde_json::to_string(&config.derived_rules)?,
            ],
        )?;

        let source_id: i64 = tx.query_row(
            "SELECT id FROM data_sources WHERE source_code = ?",
            params![&config.source_code],
            |row| row.get(0),
        )?;

        // 重写规范列与表头映射（级联删除旧映射）
        tx.execute(
            "DELETE FROM canonical_columns WHERE source_id = ?",
            params![source_id],
        )?;

        for column in &config.columns {
            tx.execute(
                r#"INSERT INTO canonical_columns (
                    source_id, internal_name, display_name, data_type,
                    is_required, special_rule_json, display_order
                ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    source_id,
                    &column.internal_name,
                    &column.display_name,
                    column.data_type.to_db_str(),
                    column.is_required as i64,
                    column
                        .special_rule
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    &column.display_order,
                ],
            )?;

            let column_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO column_mappings (canonical_column_id, source_headers_json) VALUES (?, ?)",
                params![column_id, serde_json::to_string(&column.source_headers)?],
            )?;
        }

        tx.commit()?;
        Ok(source_id)
    }

    /// 按 source_code 查询内部 id
    pub fn source_id(&self, source_code: &str) -> RepositoryResult<Option<i64>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            "SELECT id FROM data_sources WHERE source_code = ?",
            params![source_code],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 加载全部数据源配置（注册表冷启动用）
    pub fn load_all(&self) -> RepositoryResult<Vec<DataSourceConfig>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT id, source_code, source_name, category, description, target_table,
                      update_frequency, display_order, multi_part,
                      variants_json, unique_keys_json, derived_rules_json
               FROM data_sources
               ORDER BY display_order, source_code"#,
        )?;

        struct SourceRow {
            id: i64,
            config: DataSourceConfig,
        }

        let source_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, i32>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, String>(11)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut sources = Vec::new();
        for (
            id,
            source_code,
            source_name,
            category,
            description,
            target_table,
            update_frequency,
            display_order,
            multi_part,
            variants_json,
            unique_keys_json,
            derived_rules_json,
        ) in source_rows
        {
            let variants: Vec<String> = serde_json::from_str(&variants_json)?;
            let unique_keys: Vec<String> = serde_json::from_str(&unique_keys_json)?;
            let derived_rules: Vec<DerivedColumnRule> =
                serde_json::from_str(&derived_rules_json)?;

            sources.push(SourceRow {
                id,
                config: DataSourceConfig {
                    source_code,
                    source_name,
                    category: category.unwrap_or_default(),
                    description: description.unwrap_or_default(),
                    target_table,
                    update_frequency: update_frequency.unwrap_or_default(),
                    display_order,
                    columns: Vec::new(),
                    unique_keys,
                    derived_rules,
                    multi_part: multi_part != 0,
                    variants,
                },
            });
        }

        // 逐源加载规范列与别名
        let mut col_stmt = conn.prepare(
            r#"SELECT cc.internal_name, cc.display_name, cc.data_type, cc.is_required,
                      cc.special_rule_json, cc.display_order, cm.source_headers_json
               FROM canonical_columns cc
               LEFT JOIN column_mappings cm ON cm.canonical_column_id = cc.id
               WHERE cc.source_id = ?
               ORDER BY cc.display_order"#,
        )?;

        let mut configs = Vec::with_capacity(sources.len());
        for mut source in sources {
            let columns = col_stmt
                .query_map(params![source.id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i32>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for (
                internal_name,
                display_name,
                data_type,
                is_required,
                special_rule_json,
                display_order,
                source_headers_json,
            ) in columns
            {
                let special_rule: Option<SpecialValueRule> = special_rule_json
                    .map(|json| serde_json::from_str(&json))
                    .transpose()?;
                let source_headers: Vec<String> = match source_headers_json {
                    Some(json) => serde_json::from_str(&json)?,
                    None => Vec::new(),
                };

                source.config.columns.push(CanonicalColumn {
                    internal_name,
                    display_name,
                    data_type: DataType::from_db_str(&data_type),
                    is_required: is_required != 0,
                    source_headers,
                    special_rule,
                    display_order,
                });
            }

            configs.push(source.config);
        }

        Ok(configs)
    }

    /// 种子内置数据源（仅当配置表为空时写入）
    pub fn seed_if_empty(&self, configs: &[DataSourceConfig]) -> RepositoryResult<usize> {
        let existing: i64 = {
            let conn = self.get_conn()?;
            conn.query_row("SELECT COUNT(*) FROM data_sources", [], |row| row.get(0))?
        };

        if existing > 0 {
            return Ok(0);
        }

        for config in configs {
            self.save(config)?;
        }
        Ok(configs.len())
    }
}
