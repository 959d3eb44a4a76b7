// ==========================================
// CMS 参考表数据摄取系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 把季度/年度发布的监管参考表（费用表/代码目录/捆绑编辑）
//           摄取为可查询、带版本的关系数据；晋升原子切换，历史版本全保留
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 装配与版本生命周期
pub mod engine;

// 摄取层 - 外部文件解析与行转换
pub mod importer;

// 配置层 - 摄取参数与内置数据源目录
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/schema 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    AssemblyStatus, CanonicalColumn, CellValue, DataRow, DataSourceConfig, DataType,
    DataVersion, DerivedColumnRule, IngestOutcome, IngestReport, IssueKind, RowRef,
    SpecialValueRule, ValidationIssue, VersionKey, VersionPart, VersionStatus,
};

// 引擎
pub use engine::{PartAssembler, PartMeta, VersionManager};

// 摄取层
pub use importer::{
    HeaderResolution, ImportError, RowTransformer, SourceRegistry, UniversalFileParser,
};

// API
pub use api::{ApiError, ApiResult, IngestApi, IngestFileRequest};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "CMS 参考表数据摄取系统";

// ==========================================
// 预编译检查
// ==========================================
