// ==========================================
// CMS 参考表数据摄取系统 - 校验报告实体
// ==========================================
// 职责: 行级/文件级问题的结构化聚合，完整返回给调用方
// 红线: 问题绝不只写日志；报告永远随结果返回
// ==========================================

use crate::domain::row::RowRef;
use crate::domain::version::{AssemblyStatus, VersionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// 校验问题
// ==========================================

/// 问题类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// 必需表头缺失（文件级致命）
    MissingRequiredHeader,
    /// 类型转换失败（行级，计数后继续）
    TypeError,
    /// 必填列为空（行级）
    MissingRequiredValue,
    /// 文件内唯一键重复（行级，保留首次出现）
    DuplicateKey,
    /// 特殊值规则不满足（行级）
    SpecialValue,
    /// 跨分片唯一键重复（版本级致命，装配完成时才能发现）
    CrossPartDuplicate,
    /// 行写入失败（行级）
    RowInsertFailed,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::MissingRequiredHeader => "missing_required_header",
            IssueKind::TypeError => "type_error",
            IssueKind::MissingRequiredValue => "missing_required_value",
            IssueKind::DuplicateKey => "duplicate_key",
            IssueKind::SpecialValue => "special_value",
            IssueKind::CrossPartDuplicate => "cross_part_duplicate",
            IssueKind::RowInsertFailed => "row_insert_failed",
        }
    }

    /// 是否使整个版本进入 FAILED
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IssueKind::MissingRequiredHeader | IssueKind::CrossPartDuplicate
        )
    }
}

/// 单个校验问题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// 来源行（文件级问题为 None）
    pub row_ref: Option<RowRef>,
    pub column: Option<String>,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn row(row_ref: RowRef, column: &str, kind: IssueKind, message: String) -> Self {
        Self {
            row_ref: Some(row_ref),
            column: Some(column.to_string()),
            kind,
            message,
        }
    }

    pub fn file(kind: IssueKind, message: String) -> Self {
        Self {
            row_ref: None,
            column: None,
            kind,
            message,
        }
    }
}

// ==========================================
// 列统计
// ==========================================

/// 单列的空值统计与抽样值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnStats {
    pub null_count: usize,
    pub sample_values: Vec<String>,
}

impl ColumnStats {
    const SAMPLE_LIMIT: usize = 3;

    pub fn observe_null(&mut self) {
        self.null_count += 1;
    }

    pub fn observe_value(&mut self, display: String) {
        if self.sample_values.len() < Self::SAMPLE_LIMIT {
            let mut truncated = display;
            truncated.truncate(50);
            self.sample_values.push(truncated);
        }
    }
}

// ==========================================
// 摄取报告
// ==========================================

/// 单次文件摄取的完整报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// 本次摄取的批次标识
    pub ingest_id: String,
    pub file_name: String,
    pub total_rows: usize,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
    /// 空白/元信息行，跳过不算拒绝
    pub skipped_blank_rows: usize,
    /// 文件内重复（保留首次出现）
    pub duplicate_rows: usize,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
    pub column_stats: HashMap<String, ColumnStats>,
    pub elapsed_ms: u64,
}

impl IngestReport {
    pub fn new(file_name: &str) -> Self {
        Self {
            ingest_id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            total_rows: 0,
            accepted_rows: 0,
            rejected_rows: 0,
            skipped_blank_rows: 0,
            duplicate_rows: 0,
            issues: Vec::new(),
            warnings: Vec::new(),
            column_stats: HashMap::new(),
            elapsed_ms: 0,
        }
    }

    pub fn push_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn push_warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// 拒绝原因按 (类别, 列) 分组计数
    pub fn rejections_by_kind(&self) -> HashMap<(IssueKind, Option<String>), usize> {
        let mut grouped = HashMap::new();
        for issue in &self.issues {
            *grouped
                .entry((issue.kind, issue.column.clone()))
                .or_insert(0) += 1;
        }
        grouped
    }

    /// 是否存在版本级致命问题
    pub fn has_fatal_issue(&self) -> bool {
        self.issues.iter().any(|i| i.kind.is_fatal())
    }
}

// ==========================================
// 摄取结果
// ==========================================

/// ingest_file 返回给调用方的最终结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub version_id: i64,
    pub status: VersionStatus,
    pub assembly: AssemblyStatus,
    pub report: IngestReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_grouped_by_kind_and_column() {
        let mut report = IngestReport::new("rvu.csv");
        for line in [3, 7, 12] {
            report.push_issue(ValidationIssue::row(
                RowRef {
                    file_name: "rvu.csv".to_string(),
                    line_number: line,
                },
                "work_rvu",
                IssueKind::TypeError,
                "非数值".to_string(),
            ));
        }
        report.push_issue(ValidationIssue::row(
            RowRef {
                file_name: "rvu.csv".to_string(),
                line_number: 20,
            },
            "hcpcs_code",
            IssueKind::MissingRequiredValue,
            "必填".to_string(),
        ));

        let grouped = report.rejections_by_kind();
        assert_eq!(
            grouped[&(IssueKind::TypeError, Some("work_rvu".to_string()))],
            3
        );
        assert_eq!(
            grouped[&(IssueKind::MissingRequiredValue, Some("hcpcs_code".to_string()))],
            1
        );
        assert!(!report.has_fatal_issue());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(IssueKind::CrossPartDuplicate.is_fatal());
        assert!(IssueKind::MissingRequiredHeader.is_fatal());
        assert!(!IssueKind::TypeError.is_fatal());
        assert!(!IssueKind::DuplicateKey.is_fatal());
    }
}
