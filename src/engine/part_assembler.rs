// ==========================================
// CMS 参考表数据摄取系统 - 分片装配器
// ==========================================
// 职责: 多文件分片归集到同一逻辑版本的簿记
// 要点: parts_received 是按分片序号的集合而非计数器——
//       重传幂等、乱序到达由结构本身保证安全
// ==========================================

use crate::domain::report::ValidationIssue;
use crate::domain::row::DataRow;
use crate::domain::source::DataSourceConfig;
use crate::domain::version::{AssemblyStatus, VersionKey, VersionPart, VersionStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_repo::DataRowRepository;
use crate::repository::version_repo::DataVersionRepository;
use chrono::Utc;
use std::sync::Arc;

/// 分片提交的文件元数据
#[derive(Debug, Clone)]
pub struct PartMeta {
    pub file_name: String,
    pub file_hash: String,
    pub file_size_bytes: i64,
}

// ==========================================
// PartAssembler - 分片装配器
// ==========================================
// 注意: 本身不加锁；并发序列化由 VersionManager 的每版本锁保证。
pub struct PartAssembler {
    version_repo: Arc<DataVersionRepository>,
    row_repo: Arc<DataRowRepository>,
}

impl PartAssembler {
    pub fn new(
        version_repo: Arc<DataVersionRepository>,
        row_repo: Arc<DataRowRepository>,
    ) -> Self {
        Self {
            version_repo,
            row_repo,
        }
    }

    /// 提交一个分片
    ///
    /// # 规则
    /// - 首个分片固定 part_count_expected（申报值，非多分片源为 1）
    /// - 后续分片申报值必须一致，否则 PartCountMismatch
    /// - 重传已接收的分片序号 → 整体替换该分片的行（不叠加）
    /// - 终态版本拒绝提交 → VersionClosed
    pub fn submit_part(
        &self,
        source_id: i64,
        config: &DataSourceConfig,
        key: &VersionKey,
        part_index: i64,
        declared_part_count: Option<i64>,
        rows: &[DataRow],
        meta: &PartMeta,
    ) -> RepositoryResult<(i64, AssemblyStatus, Vec<ValidationIssue>)> {
        // 非多分片源的申报值固定为 1
        if !config.multi_part {
            if let Some(declared) = declared_part_count {
                if declared != 1 {
                    return Err(RepositoryError::PartCountMismatch {
                        version_label: key.version_label.clone(),
                        expected: 1,
                        declared,
                    });
                }
            }
        }

        if part_index < 1 {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "分片序号必须从 1 开始: {}",
                part_index
            )));
        }

        let now = Utc::now().naive_utc();

        // 查找或创建版本
        let (version_id, expected) = match self.version_repo.find(source_id, key)? {
            Some(version) => {
                if version.status.is_terminal() {
                    return Err(RepositoryError::VersionClosed {
                        version_label: key.version_label.clone(),
                        status: version.status.to_db_str().to_string(),
                    });
                }
                // 后续分片必须与首个分片固定的分片数一致（未申报视为沿用）
                let declared = declared_part_count.unwrap_or(version.part_count_expected);
                if declared != version.part_count_expected {
                    return Err(RepositoryError::PartCountMismatch {
                        version_label: key.version_label.clone(),
                        expected: version.part_count_expected,
                        declared,
                    });
                }
                if version.status == VersionStatus::Pending {
                    self.version_repo.mark_processing(version.id)?;
                }
                (version.id, version.part_count_expected)
            }
            None => {
                // 首个分片固定期望分片数
                let expected = if config.multi_part {
                    declared_part_count.unwrap_or(1)
                } else {
                    1
                };
                let id = self
                    .version_repo
                    .create_pending(source_id, key, expected, now)?;
                self.version_repo.mark_processing(id)?;
                (id, expected)
            }
        };

        if part_index > expected {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "分片序号 {} 超出申报分片数 {}",
                part_index, expected
            )));
        }

        // 行落地（重传 → 整体替换）+ 分片元数据簿记
        self.row_repo.ensure_table(config)?;
        let (inserted, insert_issues) =
            self.row_repo
                .replace_part_rows(config, version_id, part_index, rows)?;

        self.version_repo.upsert_part(
            version_id,
            &VersionPart {
                part_index,
                file_name: meta.file_name.clone(),
                file_hash: meta.file_hash.clone(),
                file_size_bytes: meta.file_size_bytes,
                record_count: inserted as i64,
            },
        )?;

        // 完整性只看分片序号集合
        let version = self
            .version_repo
            .find(source_id, key)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "DataVersion".to_string(),
                id: key.to_string(),
            })?;
        let assembly =
            AssemblyStatus::from_parts(&version.parts_received, version.part_count_expected);

        Ok((version_id, assembly, insert_issues))
    }
}
