// ==========================================
// CMS 参考表数据摄取系统 - 数据版本实体
// ==========================================
// 职责: 版本生命周期状态、分片装配状态的领域定义
// 红线: PENDING → PROCESSING → {COMPLETED, FAILED}，终态不可变
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// 版本状态
// ==========================================

/// 版本生命周期状态
///
/// is_current 是 COMPLETED 之上的正交标志，由显式晋升操作切换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VersionStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            VersionStatus::Pending => "PENDING",
            VersionStatus::Processing => "PROCESSING",
            VersionStatus::Completed => "COMPLETED",
            VersionStatus::Failed => "FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> VersionStatus {
        match s {
            "PROCESSING" => VersionStatus::Processing,
            "COMPLETED" => VersionStatus::Completed,
            "FAILED" => VersionStatus::Failed,
            _ => VersionStatus::Pending,
        }
    }

    /// 终态（不再接受分片提交）
    pub fn is_terminal(&self) -> bool {
        matches!(self, VersionStatus::Completed | VersionStatus::Failed)
    }
}

// ==========================================
// 版本标识
// ==========================================

/// 版本的逻辑标识 (source_code, variant, version_label)
///
/// variant 为 None 表示单一隐式变体（库内存储为空字符串）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    pub source_code: String,
    pub variant: Option<String>,
    pub version_label: String,
}

impl VersionKey {
    pub fn new(source_code: &str, variant: Option<&str>, version_label: &str) -> Self {
        Self {
            source_code: source_code.to_string(),
            variant: variant.map(|v| v.to_string()),
            version_label: version_label.to_string(),
        }
    }

    /// variant 的数据库表示（空字符串 = 无变体）
    pub fn variant_db(&self) -> &str {
        self.variant.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for VersionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant {
            Some(v) => write!(f, "{}/{}/{}", self.source_code, v, self.version_label),
            None => write!(f, "{}/{}", self.source_code, self.version_label),
        }
    }
}

// ==========================================
// 版本 / 分片记录
// ==========================================

/// 数据版本元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataVersion {
    pub id: i64,
    pub key: VersionKey,
    pub status: VersionStatus,
    pub record_count: i64,
    pub is_current: bool,
    pub part_count_expected: i64,
    /// 已接收的分片序号集合（只增不减，直至终态）
    pub parts_received: Vec<i64>,
    pub error_message: Option<String>,
    pub first_part_at: Option<NaiveDateTime>,
    pub imported_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// 单个分片的元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionPart {
    pub part_index: i64,
    pub file_name: String,
    pub file_hash: String,
    pub file_size_bytes: i64,
    pub record_count: i64,
}

// ==========================================
// 装配状态
// ==========================================

/// 分片装配进度
///
/// 完整性只由分片序号集合决定，与到达顺序无关。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyStatus {
    pub parts_received: usize,
    pub parts_expected: usize,
    pub complete: bool,
}

impl AssemblyStatus {
    /// 由分片序号集合与期望数量计算完整性
    ///
    /// 要求 1..=expected 全部到齐（序号集合等于期望区间）。
    pub fn from_parts(received: &[i64], expected: i64) -> Self {
        let complete = expected > 0
            && (1..=expected).all(|idx| received.contains(&idx));
        Self {
            parts_received: received.len(),
            parts_expected: expected as usize,
            complete,
        }
    }
}
