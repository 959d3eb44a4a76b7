// ==========================================
// CMS 参考表数据摄取系统 - 摄取层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 文件级结构错误在此定义；版本状态错误见仓储层
// ==========================================

use thiserror::Error;

/// 摄取层错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 源与变体 =====
    #[error("未知数据源: {0}")]
    UnknownSource(String),

    #[error("非法变体: source={source_code}, variant={variant}")]
    InvalidVariant {
        source_code: String,
        variant: String,
    },

    // ===== 文件结构错误（文件级致命，不落任何行） =====
    #[error("前 {scanned_rows} 行内未找到表头行，缺少必需列: {}", .columns.join(", "))]
    MissingRequiredHeaders {
        columns: Vec<String>,
        scanned_rows: usize,
    },

    #[error("文件无数据行: {0}")]
    EmptyFile(String),

    // ===== 文件读取错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),

    #[error("CSV 解析失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel 解析失败: {0}")]
    Excel(#[from] calamine::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
