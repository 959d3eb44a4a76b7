// ==========================================
// CMS 参考表数据摄取系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等的元数据 schema 初始化（配置表与版本表两组分离）
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化元数据 schema（幂等）
///
/// 两组表：
/// - 配置组: data_sources / canonical_columns / column_mappings / config_kv
/// - 版本组: data_versions / data_version_parts / ingestion_logs
///
/// 各数据源的版本化数据表由 DataRowRepository 按配置按需创建。
/// variant 以空字符串表示“无变体”，保证 UNIQUE(source_id, variant, version_label)
/// 在 SQLite 的 NULL 语义下仍然生效。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS data_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_code TEXT NOT NULL UNIQUE,
            source_name TEXT NOT NULL,
            category TEXT,
            description TEXT,
            target_table TEXT NOT NULL,
            update_frequency TEXT,
            display_order INTEGER NOT NULL DEFAULT 0,
            multi_part INTEGER NOT NULL DEFAULT 0,
            variants_json TEXT NOT NULL DEFAULT '[]',
            unique_keys_json TEXT NOT NULL DEFAULT '[]',
            derived_rules_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS canonical_columns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL REFERENCES data_sources(id) ON DELETE CASCADE,
            internal_name TEXT NOT NULL,
            display_name TEXT NOT NULL,
            data_type TEXT NOT NULL,
            is_required INTEGER NOT NULL DEFAULT 0,
            special_rule_json TEXT,
            display_order INTEGER NOT NULL DEFAULT 0,
            UNIQUE (source_id, internal_name)
        );

        CREATE TABLE IF NOT EXISTS column_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_column_id INTEGER NOT NULL UNIQUE
                REFERENCES canonical_columns(id) ON DELETE CASCADE,
            source_headers_json TEXT NOT NULL,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS data_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL REFERENCES data_sources(id),
            variant TEXT NOT NULL DEFAULT '',
            version_label TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            record_count INTEGER NOT NULL DEFAULT 0,
            is_current INTEGER NOT NULL DEFAULT 0,
            part_count_expected INTEGER NOT NULL DEFAULT 1,
            error_message TEXT,
            first_part_at TEXT,
            imported_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (source_id, variant, version_label)
        );

        CREATE INDEX IF NOT EXISTS idx_data_versions_current
            ON data_versions(source_id, variant, is_current);

        CREATE TABLE IF NOT EXISTS data_version_parts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data_version_id INTEGER NOT NULL
                REFERENCES data_versions(id) ON DELETE CASCADE,
            part_index INTEGER NOT NULL,
            file_name TEXT,
            file_hash TEXT,
            file_size_bytes INTEGER,
            record_count INTEGER NOT NULL DEFAULT 0,
            imported_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (data_version_id, part_index)
        );

        CREATE TABLE IF NOT EXISTS ingestion_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data_version_id INTEGER NOT NULL
                REFERENCES data_versions(id) ON DELETE CASCADE,
            log_level TEXT NOT NULL,
            message TEXT NOT NULL,
            details TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )?;

    Ok(())
}
