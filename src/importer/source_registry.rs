// ==========================================
// CMS 参考表数据摄取系统 - 数据源注册表
// ==========================================
// 职责: source_code → DataSourceConfig 的纯内存查找
// 红线: resolve 不做 I/O；按代码查找，绝不依据文件内容猜测数据源
// ==========================================

use crate::domain::source::DataSourceConfig;
use crate::importer::error::{ImportError, ImportResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ==========================================
// SourceRegistry - 数据源注册表
// ==========================================
pub struct SourceRegistry {
    configs: RwLock<HashMap<String, Arc<DataSourceConfig>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// 注册（或替换）一个数据源配置
    ///
    /// 新增数据源是纯数据操作：配置持久化后调用本方法即可生效，无需新代码。
    pub fn register(&self, config: DataSourceConfig) {
        // 注册表只是 HashMap，锁中毒时恢复内部状态即可
        let mut configs = self.configs.write().unwrap_or_else(|p| p.into_inner());
        configs.insert(config.source_code.clone(), Arc::new(config));
    }

    /// 批量注册（冷启动时从配置仓储加载）
    pub fn register_all(&self, configs: Vec<DataSourceConfig>) {
        for config in configs {
            self.register(config);
        }
    }

    /// 按 source_code 解析配置
    pub fn resolve(&self, source_code: &str) -> ImportResult<Arc<DataSourceConfig>> {
        let configs = self.configs.read().unwrap_or_else(|p| p.into_inner());
        configs
            .get(source_code)
            .cloned()
            .ok_or_else(|| ImportError::UnknownSource(source_code.to_string()))
    }

}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_sources::builtin_configs;

    #[test]
    fn test_resolve_known_and_unknown() {
        let registry = SourceRegistry::new();
        registry.register_all(builtin_configs());

        let rvu = registry.resolve("PFS_RVU").unwrap();
        assert_eq!(rvu.target_table, "pfs_rvu");

        let err = registry.resolve("NOT_A_SOURCE").unwrap_err();
        assert!(matches!(err, ImportError::UnknownSource(code) if code == "NOT_A_SOURCE"));
    }

    #[test]
    fn test_runtime_registration() {
        let registry = SourceRegistry::new();
        assert!(registry.resolve("PFS_RVU").is_err());

        let config = builtin_configs()
            .into_iter()
            .find(|c| c.source_code == "PFS_RVU")
            .unwrap();
        registry.register(config);
        assert!(registry.resolve("PFS_RVU").is_ok());
    }
}
