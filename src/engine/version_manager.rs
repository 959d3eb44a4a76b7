// ==========================================
// CMS 参考表数据摄取系统 - 版本管理器
// ==========================================
// 职责: 版本生命周期状态机 + 晋升/超时协调
// 状态机: PENDING → PROCESSING → {COMPLETED, FAILED}
// 红线:
// - 同一版本的变更必须经每版本锁串行化（并发分片不得错账、不得双触发定稿）
// - 晋升只走仓储层单事务切换；任何失败都保持旧 current 原地不动
// ==========================================

use crate::domain::report::{IssueKind, ValidationIssue};
use crate::domain::row::{key_fingerprint, DataRow};
use crate::domain::source::DataSourceConfig;
use crate::domain::version::{AssemblyStatus, DataVersion, VersionKey};
use crate::engine::part_assembler::{PartAssembler, PartMeta};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::ingest_log_repo::IngestLogRepository;
use crate::repository::row_repo::DataRowRepository;
use crate::repository::version_repo::DataVersionRepository;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// ==========================================
// 每版本锁注册表
// ==========================================
// 同一 (源,变体,标签) 的分片提交/定稿/晋升串行；不同版本互不阻塞。
struct VersionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VersionLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &VersionKey) -> Arc<tokio::sync::Mutex<()>> {
        // 锁注册表只是 HashMap，中毒时恢复内部状态即可
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

// ==========================================
// VersionManager - 版本管理器
// ==========================================
pub struct VersionManager {
    version_repo: Arc<DataVersionRepository>,
    row_repo: Arc<DataRowRepository>,
    log_repo: Arc<IngestLogRepository>,
    assembler: PartAssembler,
    locks: VersionLocks,
}

impl VersionManager {
    pub fn new(
        version_repo: Arc<DataVersionRepository>,
        row_repo: Arc<DataRowRepository>,
        log_repo: Arc<IngestLogRepository>,
    ) -> Self {
        let assembler = PartAssembler::new(version_repo.clone(), row_repo.clone());
        Self {
            version_repo,
            row_repo,
            log_repo,
            assembler,
            locks: VersionLocks::new(),
        }
    }

    /// 提交一个分片；若集齐全部分片则在同一锁内定稿
    ///
    /// 定稿 = 跨分片唯一键校验通过 → COMPLETED；发现跨分片重复 → FAILED。
    /// 该校验只能在装配完成后做——单分片各自检查看不到跨分片重复。
    pub async fn submit_part(
        &self,
        source_id: i64,
        config: &DataSourceConfig,
        key: &VersionKey,
        part_index: i64,
        declared_part_count: Option<i64>,
        rows: &[DataRow],
        meta: &PartMeta,
    ) -> RepositoryResult<(DataVersion, AssemblyStatus, Vec<ValidationIssue>)> {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;

        let (version_id, assembly, mut issues) = self.assembler.submit_part(
            source_id,
            config,
            key,
            part_index,
            declared_part_count,
            rows,
            meta,
        )?;

        self.log_repo.insert(
            version_id,
            "INFO",
            &format!(
                "分片 {}/{} 已接收: {} ({} 行)",
                part_index, assembly.parts_expected, meta.file_name, rows.len()
            ),
            Some(&json!({
                "part_index": part_index,
                "file_hash": meta.file_hash,
                "rows": rows.len(),
            })),
        )?;

        if assembly.complete {
            let fatal = self.finalize(version_id, config, &mut issues)?;
            if fatal {
                warn!(version = %key, "跨分片唯一键重复，版本转 FAILED");
            } else {
                info!(version = %key, "全部分片集齐，版本定稿为 COMPLETED");
            }
        }

        let version = self
            .version_repo
            .find(source_id, key)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "DataVersion".to_string(),
                id: key.to_string(),
            })?;

        Ok((version, assembly, issues))
    }

    /// 装配完成后的定稿: 跨分片唯一键校验 → COMPLETED / FAILED
    ///
    /// 返回是否发现致命问题。
    fn finalize(
        &self,
        version_id: i64,
        config: &DataSourceConfig,
        issues: &mut Vec<ValidationIssue>,
    ) -> RepositoryResult<bool> {
        let tuples = self.row_repo.fetch_key_tuples(config, version_id)?;

        // 指纹 → 首次出现的分片序号
        let mut seen: HashMap<String, i64> = HashMap::new();
        let mut duplicates = Vec::new();
        for (values, part_index, row_ref) in &tuples {
            let fingerprint = key_fingerprint(values);
            match seen.get(&fingerprint) {
                Some(first_part) => {
                    let display: Vec<String> =
                        values.iter().map(|v| v.display()).collect();
                    duplicates.push((display.join("/"), *first_part, *part_index, row_ref.clone()));
                }
                None => {
                    seen.insert(fingerprint, *part_index);
                }
            }
        }

        if duplicates.is_empty() {
            let record_count = self.row_repo.count_rows(config, version_id)?;
            self.version_repo
                .mark_completed(version_id, record_count, Utc::now().naive_utc())?;
            self.log_repo.insert(
                version_id,
                "INFO",
                &format!("版本定稿: {} 行", record_count),
                None,
            )?;
            return Ok(false);
        }

        for (display, first_part, part_index, row_ref) in &duplicates {
            issues.push(ValidationIssue {
                row_ref: Some(row_ref.clone()),
                column: Some(config.unique_keys.join("+")),
                kind: IssueKind::CrossPartDuplicate,
                message: format!(
                    "唯一键 ({}) 在分片 {} 与分片 {} 重复",
                    display, first_part, part_index
                ),
            });
        }

        let message = format!("跨分片唯一键重复 {} 处", duplicates.len());
        self.version_repo.mark_failed(version_id, &message)?;
        self.log_repo.insert(
            version_id,
            "ERROR",
            &message,
            Some(&json!({
                "duplicate_count": duplicates.len(),
                "unique_keys": config.unique_keys,
            })),
        )?;
        Ok(true)
    }

    /// 晋升 COMPLETED 版本为 current（显式操作，不随定稿自动发生）
    pub async fn promote(&self, source_id: i64, key: &VersionKey) -> RepositoryResult<()> {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;

        self.version_repo.promote(source_id, key)?;
        info!(version = %key, "版本已晋升为 current");
        Ok(())
    }

    /// 等待分片超时清扫: first_part_at 早于 max_wait 的非终态版本转 FAILED
    ///
    /// 已完成版本与其 current 状态不受影响。
    pub async fn fail_expired(&self, max_wait_secs: i64) -> RepositoryResult<Vec<i64>> {
        let cutoff = Utc::now().naive_utc() - Duration::seconds(max_wait_secs);
        let expired = self.version_repo.fail_expired(cutoff)?;
        for version_id in &expired {
            warn!(version_id, "等待剩余分片超时，版本转 FAILED");
            self.log_repo.insert(
                *version_id,
                "WARNING",
                "等待剩余分片超时，版本转 FAILED",
                None,
            )?;
        }
        Ok(expired)
    }
}
