// ==========================================
// CMS 参考表数据摄取系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型（数据源配置 / 类型化行 / 版本 / 报告）
// 红线: 不含数据访问逻辑，不含摄取流程逻辑
// ==========================================

pub mod report;
pub mod row;
pub mod source;
pub mod version;

// 重导出核心类型
pub use report::{ColumnStats, IngestOutcome, IngestReport, IssueKind, ValidationIssue};
pub use row::{key_fingerprint, CellValue, DataRow, RowRef};
pub use source::{
    CanonicalColumn, DataSourceConfig, DataType, DerivedColumnRule, SpecialValueRule,
};
pub use version::{AssemblyStatus, DataVersion, VersionKey, VersionPart, VersionStatus};
