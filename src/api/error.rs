// ==========================================
// CMS 参考表数据摄取系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换摄取层/仓储层错误为用户友好的错误消息
// 约定: 错误信息必须包含显式原因，调用方负责面向用户的展示
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 源与变体
    // ==========================================
    #[error("未知数据源: {0}")]
    UnknownSource(String),

    #[error("非法变体: {source_code} 不接受变体 '{variant}'")]
    InvalidVariant {
        source_code: String,
        variant: String,
    },

    // ==========================================
    // 文件结构错误（未落任何行）
    // ==========================================
    #[error("结构性错误: {0}")]
    Structural(String),

    // ==========================================
    // 版本状态错误
    // ==========================================
    #[error("分片数不一致: {version_label} 期望 {expected}，本次申报 {declared}")]
    PartCountMismatch {
        version_label: String,
        expected: i64,
        declared: i64,
    },

    #[error("版本已关闭，不再接受分片: {version_label} (status={status})")]
    VersionClosed {
        version_label: String,
        status: String,
    },

    #[error("版本未完成，不能晋升: {version_label} (status={status})")]
    VersionNotCompleted {
        version_label: String,
        status: String,
    },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportFailure(String),

    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::UnknownSource(code) => ApiError::UnknownSource(code),
            ImportError::InvalidVariant {
                source_code,
                variant,
            } => ApiError::InvalidVariant {
                source_code,
                variant,
            },
            ImportError::MissingRequiredHeaders { .. } | ImportError::EmptyFile(_) => {
                ApiError::Structural(err.to_string())
            }
            ImportError::FileNotFound(_)
            | ImportError::UnsupportedFormat(_)
            | ImportError::Csv(_)
            | ImportError::Excel(_)
            | ImportError::Io(_) => ApiError::ImportFailure(err.to_string()),
            ImportError::Other(e) => ApiError::Other(e),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将仓储层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 版本状态错误
            RepositoryError::PartCountMismatch {
                version_label,
                expected,
                declared,
            } => ApiError::PartCountMismatch {
                version_label,
                expected,
                declared,
            },
            RepositoryError::VersionClosed {
                version_label,
                status,
            } => ApiError::VersionClosed {
                version_label,
                status,
            },
            RepositoryError::VersionNotCompleted {
                version_label,
                status,
            } => ApiError::VersionNotCompleted {
                version_label,
                status,
            },

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg)
            | RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::InvalidIdentifier(name) => {
                ApiError::InvalidInput(format!("非法标识符: {}", name))
            }

            // 业务规则错误
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::BusinessRuleViolation(format!("无效的状态转换: {} → {}", from, to))
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(e) => ApiError::Other(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
