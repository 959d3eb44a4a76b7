// ==========================================
// CMS 参考表数据摄取系统 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口，屏蔽数据库细节
// 约束: 所有查询使用参数化，防止 SQL 注入；配置驱动的标识符走白名单校验
// 红线: Repository 不含业务逻辑
// ==========================================

pub mod error;
pub mod ingest_log_repo;
pub mod row_repo;
pub mod source_repo;
pub mod version_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use ingest_log_repo::{IngestLogEntry, IngestLogRepository};
pub use row_repo::DataRowRepository;
pub use source_repo::SourceConfigRepository;
pub use version_repo::DataVersionRepository;
