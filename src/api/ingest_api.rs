// ==========================================
// CMS 参考表数据摄取系统 - 摄取API
// ==========================================
// 职责: 面向请求处理层的门面——摄取文件 / 晋升版本 / 查询版本
// 流程: 解析源配置 → 文件解析 → 表头解析 → 行转换 → 分片装配 → 定稿
// 红线: 结构错误不落任何行；行级问题计数后继续；报告完整返回
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::builtin_sources::builtin_configs;
use crate::config::config_manager::ConfigManager;
use crate::config::ingest_config_trait::IngestConfigReader;
use crate::domain::report::{IngestOutcome, IngestReport, IssueKind, ValidationIssue};
use crate::domain::row::{DataRow, RowRef};
use crate::domain::source::DataSourceConfig;
use crate::domain::version::{DataVersion, VersionKey};
use crate::engine::part_assembler::PartMeta;
use crate::engine::version_manager::VersionManager;
use crate::importer::file_parser::{file_sha256, FileParser, RawTable, UniversalFileParser};
use crate::importer::header_resolver::resolve_headers;
use crate::importer::row_transformer::RowTransformer;
use crate::importer::source_registry::SourceRegistry;
use crate::importer::transformers;
use crate::importer::error::ImportError;
use crate::repository::ingest_log_repo::IngestLogRepository;
use crate::repository::row_repo::DataRowRepository;
use crate::repository::source_repo::SourceConfigRepository;
use crate::repository::version_repo::DataVersionRepository;
use futures::future::join_all;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// 空白行判定阈值（空单元格占比）
const BLANK_ROW_THRESHOLD: f64 = 0.8;

// ==========================================
// 请求对象
// ==========================================

/// 单文件摄取请求
#[derive(Debug, Clone)]
pub struct IngestFileRequest {
    pub source_code: String,
    pub variant: Option<String>,
    pub version_label: String,
    /// 分片序号（1 起始；单文件版本可省略）
    pub part_index: Option<i64>,
    /// 申报的分片总数（首个分片固定期望值）
    pub declared_part_count: Option<i64>,
    pub file_path: String,
}

// ==========================================
// IngestApi - 摄取API
// ==========================================
pub struct IngestApi {
    registry: Arc<SourceRegistry>,
    source_repo: Arc<SourceConfigRepository>,
    version_repo: Arc<DataVersionRepository>,
    log_repo: Arc<IngestLogRepository>,
    version_manager: Arc<VersionManager>,
    settings: Arc<ConfigManager>,
    parser: UniversalFileParser,
}

impl IngestApi {
    /// 从已有连接装配（初始化 schema + 种子内置数据源 + 加载注册表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseError(format!("锁获取失败: {}", e)))?;
            crate::db::configure_sqlite_connection(&guard)
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
            crate::db::init_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        let source_repo = Arc::new(SourceConfigRepository::new(conn.clone()));
        source_repo.seed_if_empty(&builtin_configs())?;

        let registry = Arc::new(SourceRegistry::new());
        registry.register_all(source_repo.load_all()?);

        let version_repo = Arc::new(DataVersionRepository::new(conn.clone()));
        let row_repo = Arc::new(DataRowRepository::new(conn.clone()));
        let log_repo = Arc::new(IngestLogRepository::new(conn.clone()));
        let version_manager = Arc::new(VersionManager::new(
            version_repo.clone(),
            row_repo,
            log_repo.clone(),
        ));
        let settings = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| ApiError::InternalError(e.to_string()))?,
        );

        Ok(Self {
            registry,
            source_repo,
            version_repo,
            log_repo,
            version_manager,
            settings,
            parser: UniversalFileParser,
        })
    }

    /// 打开数据库文件并装配
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 运行期注册新数据源（持久化 + 注册表生效，无需新代码）
    pub fn register_source(&self, config: DataSourceConfig) -> ApiResult<()> {
        self.source_repo.save(&config)?;
        self.registry.register(config);
        Ok(())
    }

    fn resolve_source(
        &self,
        source_code: &str,
        variant: Option<&str>,
    ) -> ApiResult<(Arc<DataSourceConfig>, i64)> {
        let config = self.registry.resolve(source_code)?;

        if !config.is_valid_variant(variant) {
            return Err(ApiError::InvalidVariant {
                source_code: source_code.to_string(),
                variant: variant.unwrap_or("(缺省)").to_string(),
            });
        }

        let source_id = self
            .source_repo
            .source_id(source_code)?
            .ok_or_else(|| ApiError::UnknownSource(source_code.to_string()))?;

        Ok((config, source_id))
    }

    /// 摄取一个文件（一个版本的一个分片）
    ///
    /// # 流程
    /// 1. 解析源配置与变体
    /// 2. 超时清扫（等待分片超时的版本转 FAILED）
    /// 3. 文件解析（哈希、重复上传检查）
    /// 4. 表头行探测与列映射（必需列缺失 → 结构错误，不落行）
    /// 5. 行转换（空白行跳过、文件内去重、列统计）
    /// 6. 分片装配；集齐后跨分片唯一键校验并定稿
    pub async fn ingest_file(&self, request: &IngestFileRequest) -> ApiResult<IngestOutcome> {
        let started = std::time::Instant::now();
        let (config, source_id) =
            self.resolve_source(&request.source_code, request.variant.as_deref())?;
        let key = VersionKey::new(
            &request.source_code,
            request.variant.as_deref(),
            &request.version_label,
        );

        // 超时清扫
        let max_wait = self
            .settings
            .get_max_part_wait_secs()
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        self.version_manager.fail_expired(max_wait).await?;

        // 文件解析
        let path = Path::new(&request.file_path);
        let (file_hash, file_size_bytes) = file_sha256(path).map_err(ApiError::from)?;
        let table = self.parser.parse(path).map_err(ApiError::from)?;

        let mut report = IngestReport::new(&table.file_name);

        // 重复上传检查（同哈希的已完成版本 → 告警，不阻断）
        if let Some((label, file_name)) = self
            .version_repo
            .find_completed_by_file_hash(source_id, &file_hash)?
        {
            report.push_warning(format!(
                "文件内容与已完成版本 {} 的 {} 相同",
                label, file_name
            ));
        }

        // 表头解析
        let scan_rows = self
            .settings
            .get_header_scan_rows()
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        // 必需列缺失 → 结构错误直接返回，未落任何行
        let resolution = resolve_headers(&table.rows, &config, scan_rows)?;

        for header in &resolution.unmatched_headers {
            report.push_warning(format!("未识别的多余列: {}", header));
        }

        if table.rows.len() <= resolution.data_start_row() {
            return Err(ApiError::from(ImportError::EmptyFile(
                table.file_name.clone(),
            )));
        }

        // 行转换 + 文件内去重
        let accepted = self.transform_rows(&table, &resolution, &config, &mut report);

        // 分片装配与定稿
        let part_index = request.part_index.unwrap_or(1);
        let meta = PartMeta {
            file_name: table.file_name.clone(),
            file_hash,
            file_size_bytes,
        };
        let (version, assembly, submit_issues) = self
            .version_manager
            .submit_part(
                source_id,
                &config,
                &key,
                part_index,
                request.declared_part_count,
                &accepted,
                &meta,
            )
            .await?;

        let insert_failures = submit_issues
            .iter()
            .filter(|i| i.kind == IssueKind::RowInsertFailed)
            .count();
        report.accepted_rows = accepted.len() - insert_failures;
        report.rejected_rows += insert_failures;
        for issue in submit_issues {
            report.push_issue(issue);
        }

        // 行数对比告警（相对上一完成版本）
        self.row_count_sanity_warning(source_id, &request.variant, &mut report)
            .await?;

        report.elapsed_ms = started.elapsed().as_millis() as u64;

        // 报告摘要留痕
        self.log_repo.insert(
            version.id,
            "INFO",
            &format!(
                "摄取完成: 共 {} 行, 接受 {}, 拒绝 {}, 文件内重复 {}",
                report.total_rows,
                report.accepted_rows,
                report.rejected_rows,
                report.duplicate_rows
            ),
            Some(&json!({
                "ingest_id": report.ingest_id,
                "part_index": part_index,
                "warnings": report.warnings.len(),
                "issues": report.issues.len(),
            })),
        )?;

        info!(
            version = %key,
            accepted = report.accepted_rows,
            rejected = report.rejected_rows,
            "文件摄取完成"
        );

        Ok(IngestOutcome {
            version_id: version.id,
            status: version.status,
            assembly,
            report,
        })
    }

    /// 行转换循环（空白行跳过；文件内唯一键重复保留首次出现）
    fn transform_rows(
        &self,
        table: &RawTable,
        resolution: &crate::importer::header_resolver::HeaderResolution,
        config: &DataSourceConfig,
        report: &mut IngestReport,
    ) -> Vec<DataRow> {
        let mut accepted = Vec::new();
        let mut seen_keys: HashSet<String> = HashSet::new();

        for (row_idx, raw_row) in table
            .rows
            .iter()
            .enumerate()
            .skip(resolution.data_start_row())
        {
            if transformers::is_blank_row(raw_row, BLANK_ROW_THRESHOLD) {
                report.skipped_blank_rows += 1;
                continue;
            }

            report.total_rows += 1;
            let row_ref = RowRef {
                file_name: table.file_name.clone(),
                line_number: row_idx + 1,
            };

            let (row, issues) = RowTransformer::transform(raw_row, resolution, config, &row_ref);
            for issue in issues {
                report.push_issue(issue);
            }

            let row = match row {
                Some(row) => row,
                None => {
                    report.rejected_rows += 1;
                    continue;
                }
            };

            // 文件内去重: 保留首次出现，重复行记告警
            let fingerprint = row.key_fingerprint(&config.unique_keys);
            if !seen_keys.insert(fingerprint) {
                report.duplicate_rows += 1;
                report.push_issue(ValidationIssue::row(
                    row_ref,
                    &config.unique_keys.join("+"),
                    IssueKind::DuplicateKey,
                    "文件内唯一键重复，保留首次出现".to_string(),
                ));
                continue;
            }

            // 列统计
            for column in &config.columns {
                let stats = report
                    .column_stats
                    .entry(column.internal_name.clone())
                    .or_default();
                let value = row.get(&column.internal_name);
                if value.is_null() {
                    stats.observe_null();
                } else {
                    stats.observe_value(value.display());
                }
            }

            accepted.push(row);
        }

        accepted
    }

    async fn row_count_sanity_warning(
        &self,
        source_id: i64,
        variant: &Option<String>,
        report: &mut IngestReport,
    ) -> ApiResult<()> {
        let warn_ratio = self
            .settings
            .get_row_count_warn_ratio()
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;

        if let Some(prev_count) = self
            .version_repo
            .last_completed_record_count(source_id, variant.as_deref())?
        {
            if prev_count > 0 {
                let current = report.accepted_rows as f64;
                let prev = prev_count as f64;
                if current < prev * warn_ratio {
                    report.push_warning(format!(
                        "本分片行数 ({}) 明显低于上一完成版本 ({})，请确认文件正确",
                        report.accepted_rows, prev_count
                    ));
                } else if current > prev * (2.0 - warn_ratio) {
                    report.push_warning(format!(
                        "本分片行数 ({}) 明显高于上一完成版本 ({})，新版本可能属正常",
                        report.accepted_rows, prev_count
                    ));
                }
            }
        }
        Ok(())
    }

    /// 批量摄取（逐文件返回各自的结果）
    pub async fn ingest_files(
        &self,
        requests: &[IngestFileRequest],
    ) -> Vec<ApiResult<IngestOutcome>> {
        join_all(requests.iter().map(|request| self.ingest_file(request))).await
    }

    /// 晋升 COMPLETED 版本为 current
    ///
    /// 显式操作，不随定稿自动发生；原子切换由仓储层单事务保证。
    pub async fn promote_version(
        &self,
        source_code: &str,
        variant: Option<&str>,
        version_label: &str,
    ) -> ApiResult<()> {
        let (_config, source_id) = self.resolve_source(source_code, variant)?;
        let key = VersionKey::new(source_code, variant, version_label);
        self.version_manager.promote(source_id, &key).await?;
        Ok(())
    }

    /// 查询某 (源,变体) 的全部版本元数据，新的在前
    pub fn list_versions(
        &self,
        source_code: &str,
        variant: Option<&str>,
    ) -> ApiResult<Vec<DataVersion>> {
        let (_config, source_id) = self.resolve_source(source_code, variant)?;
        Ok(self.version_repo.list(source_id, source_code, variant)?)
    }

    /// 查询当前 current 版本
    pub fn current_version(
        &self,
        source_code: &str,
        variant: Option<&str>,
    ) -> ApiResult<Option<DataVersion>> {
        let (_config, source_id) = self.resolve_source(source_code, variant)?;
        Ok(self
            .version_repo
            .find_current(source_id, source_code, variant)?)
    }

    /// 删除 FAILED 版本，释放其 version_label 供重新摄取
    pub fn delete_failed_version(
        &self,
        source_code: &str,
        variant: Option<&str>,
        version_label: &str,
    ) -> ApiResult<bool> {
        let (_config, source_id) = self.resolve_source(source_code, variant)?;
        let key = VersionKey::new(source_code, variant, version_label);
        Ok(self.version_repo.delete_failed(source_id, &key)?)
    }

    /// 某版本的摄取事件留痕
    pub fn ingestion_logs(
        &self,
        version_id: i64,
    ) -> ApiResult<Vec<crate::repository::ingest_log_repo::IngestLogEntry>> {
        Ok(self.log_repo.list_for_version(version_id)?)
    }
}
