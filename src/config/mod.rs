// ==========================================
// CMS 参考表数据摄取系统 - 配置层
// ==========================================
// 职责: 摄取参数配置管理 + 内置数据源目录
// 存储: config_kv 表 (key-value + scope)
// ==========================================

pub mod builtin_sources;
pub mod config_manager;
pub mod ingest_config_trait;

// 重导出核心配置管理器
pub use builtin_sources::builtin_configs;
pub use config_manager::{config_keys, ConfigManager};
pub use ingest_config_trait::IngestConfigReader;
