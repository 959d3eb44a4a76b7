// ==========================================
// 摄取API端到端测试
// ==========================================
// 测试目标: 文件 → 表头解析 → 行转换 → 版本定稿 → 晋升 的完整链路
// ==========================================


use cms_refdata::api::{ApiError, IngestFileRequest};
use cms_refdata::config::builtin_sources::builtin_configs;
use cms_refdata::domain::report::IssueKind;
use cms_refdata::domain::row::CellValue;
use cms_refdata::domain::version::VersionStatus;
use cms_refdata::logging;
use cms_refdata::repository::DataRowRepository;
use std::sync::{Arc, Mutex};

fn request(source: &str, file: &str, label: &str) -> IngestFileRequest {
    IngestFileRequest {
        source_code: source.to_string(),
        variant: None,
        version_label: label.to_string(),
        part_index: None,
        declared_part_count: None,
        file_path: file.to_string(),
    }
}

#[tokio::test]
async fn test_pfs_rvu_single_part_flow() {
    logging::init_test();
    let (_db, db_path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let file = test_helpers::write_fixture(
        dir.path(),
        "rvu_2026a.csv",
        "HCPCS,MOD,WORK RVU\n99213,,1.5\n",
    );

    let outcome = api
        .ingest_file(&request("PFS_RVU", file.to_str().unwrap(), "2026A"))
        .await
        .unwrap();

    // 单分片版本立即定稿
    assert_eq!(outcome.status, VersionStatus::Completed);
    assert!(outcome.assembly.complete);
    assert_eq!(outcome.report.total_rows, 1);
    assert_eq!(outcome.report.accepted_rows, 1);
    assert_eq!(outcome.report.rejected_rows, 0);

    // 校验落库的类型化行
    let conn = Arc::new(Mutex::new(test_helpers::open_raw_connection(&db_path)));
    let row_repo = DataRowRepository::new(conn);
    let config = builtin_configs()
        .into_iter()
        .find(|c| c.source_code == "PFS_RVU")
        .unwrap();
    let rows = row_repo.fetch_rows(&config, outcome.version_id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("hcpcs_code"), &CellValue::Text("99213".to_string()));
    assert_eq!(rows[0].get("modifier"), &CellValue::Null);
    assert_eq!(rows[0].get("work_rvu"), &CellValue::Numeric(1.5));

    // 定稿不自动晋升
    assert!(api.current_version("PFS_RVU", None).unwrap().is_none());

    // 显式晋升
    api.promote_version("PFS_RVU", None, "2026A").await.unwrap();
    let current = api.current_version("PFS_RVU", None).unwrap().unwrap();
    assert_eq!(current.key.version_label, "2026A");
    assert_eq!(current.record_count, 1);
}

#[tokio::test]
async fn test_header_resolution_tolerates_casing_and_padding() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    // 小写 + 填充空白 + 内部多余空白的表头
    let file = test_helpers::write_fixture(
        dir.path(),
        "rvu_padded.csv",
        "  hcpcs  , mod , work   rvu \n99214,26,2.1\n",
    );

    let outcome = api
        .ingest_file(&request("PFS_RVU", file.to_str().unwrap(), "2026B"))
        .await
        .unwrap();
    assert_eq!(outcome.report.accepted_rows, 1);
}

#[tokio::test]
async fn test_promotion_swaps_exactly_one_current() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let file_a = test_helpers::write_fixture(
        dir.path(),
        "rvu_a.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5")]),
    );
    let file_b = test_helpers::write_fixture(
        dir.path(),
        "rvu_b.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.6")]),
    );

    api.ingest_file(&request("PFS_RVU", file_a.to_str().unwrap(), "2026A"))
        .await
        .unwrap();
    api.ingest_file(&request("PFS_RVU", file_b.to_str().unwrap(), "2026B"))
        .await
        .unwrap();

    api.promote_version("PFS_RVU", None, "2026A").await.unwrap();
    api.promote_version("PFS_RVU", None, "2026B").await.unwrap();

    let versions = api.list_versions("PFS_RVU", None).unwrap();
    assert_eq!(versions.len(), 2);
    // 恰好一个 current；历史版本保留
    assert_eq!(versions.iter().filter(|v| v.is_current).count(), 1);
    let current = api.current_version("PFS_RVU", None).unwrap().unwrap();
    assert_eq!(current.key.version_label, "2026B");
}

#[tokio::test]
async fn test_ncci_ptp_special_values_roundtrip() {
    logging::init_test();
    let (_db, db_path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let content = "\
Column 1,Column 2,Modifier,Effective Date,Deletion Date,PTP Edit Rationale,*=in existence prior to 1996\n\
99213,36415,1,20260101,*,Misuse of column two,*\n\
10021,10004,0,20260101,20260401,CPT Manual coding,\n";
    let file = test_helpers::write_fixture(dir.path(), "ptp_prac.csv", content);

    let outcome = api
        .ingest_file(&IngestFileRequest {
            source_code: "NCCI_PTP".to_string(),
            variant: Some("practitioner".to_string()),
            version_label: "2026Q1".to_string(),
            part_index: Some(1),
            declared_part_count: Some(1),
            file_path: file.to_str().unwrap().to_string(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Completed);
    assert_eq!(outcome.report.accepted_rows, 2);

    let conn = Arc::new(Mutex::new(test_helpers::open_raw_connection(&db_path)));
    let row_repo = DataRowRepository::new(conn);
    let config = builtin_configs()
        .into_iter()
        .find(|c| c.source_code == "NCCI_PTP")
        .unwrap();
    let rows = row_repo.fetch_rows(&config, outcome.version_id).unwrap();
    assert_eq!(rows.len(), 2);

    // '*' 删除日期 → NULL，'*' 1996前标志 → true
    let active = rows
        .iter()
        .find(|r| r.get("component_code") == &CellValue::Text("36415".to_string()))
        .unwrap();
    assert_eq!(active.get("deletion_date"), &CellValue::Null);
    assert_eq!(active.get("prior_1996_flag"), &CellValue::Boolean(true));
    assert_eq!(active.get("modifier_indicator"), &CellValue::Integer(1));

    // 实际日期正常转换
    let deleted = rows
        .iter()
        .find(|r| r.get("component_code") == &CellValue::Text("10004".to_string()))
        .unwrap();
    assert_eq!(
        deleted.get("deletion_date"),
        &CellValue::Date(chrono::NaiveDate::from_ymd_opt(2026, 4, 1).unwrap())
    );
}

#[tokio::test]
async fn test_mue_zero_is_stored_as_zero() {
    logging::init_test();
    let (_db, db_path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let content = "\
HCPCS/CPT Code,DME Supplier Services MUE Values,MUE Adjudication Indicator,MUE Rationale\n\
E0100,0,3 Date of Service Edit: Clinical,Nature of Equipment\n\
E0105,2,1 Line Edit,CMS Policy\n";
    let file = test_helpers::write_fixture(dir.path(), "mue_dme.csv", content);

    let outcome = api
        .ingest_file(&request("NCCI_MUE_DME", file.to_str().unwrap(), "2026Q1"))
        .await
        .unwrap();
    assert_eq!(outcome.report.accepted_rows, 2);

    let conn = Arc::new(Mutex::new(test_helpers::open_raw_connection(&db_path)));
    let row_repo = DataRowRepository::new(conn);
    let config = builtin_configs()
        .into_iter()
        .find(|c| c.source_code == "NCCI_MUE_DME")
        .unwrap();
    let rows = row_repo.fetch_rows(&config, outcome.version_id).unwrap();

    let zero_row = rows
        .iter()
        .find(|r| r.get("hcpcs_code") == &CellValue::Text("E0100".to_string()))
        .unwrap();
    // MUE 0 是有效限额，存 0 不存 NULL
    assert_eq!(zero_row.get("mue_value"), &CellValue::Integer(0));
    // mai_id 从描述文本派生
    assert_eq!(zero_row.get("mai_id"), &CellValue::Integer(3));
}

#[tokio::test]
async fn test_unknown_source_and_invalid_variant() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();
    let file = test_helpers::write_fixture(
        dir.path(),
        "whatever.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5")]),
    );

    let err = api
        .ingest_file(&request("NOT_A_SOURCE", file.to_str().unwrap(), "2026A"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UnknownSource(code) if code == "NOT_A_SOURCE"));

    // PFS_RVU 不接受变体
    let mut bad_variant = request("PFS_RVU", file.to_str().unwrap(), "2026A");
    bad_variant.variant = Some("hospital".to_string());
    let err = api.ingest_file(&bad_variant).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidVariant { .. }));

    // NCCI_PTP 必须给出变体
    let mut missing_variant = request("NCCI_PTP", file.to_str().unwrap(), "2026Q1");
    missing_variant.variant = None;
    let err = api.ingest_file(&missing_variant).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidVariant { .. }));
}

#[tokio::test]
async fn test_missing_required_header_is_structural_and_commits_nothing() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    // 缺 HCPCS 列
    let file = test_helpers::write_fixture(
        dir.path(),
        "rvu_broken.csv",
        "MOD,WORK RVU\n,1.5\n",
    );

    let err = api
        .ingest_file(&request("PFS_RVU", file.to_str().unwrap(), "2026A"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Structural(_)));

    // 结构错误不建版本、不落行
    assert!(api.list_versions("PFS_RVU", None).unwrap().is_empty());
}

#[tokio::test]
async fn test_row_level_errors_do_not_abort_batch() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    // 第二行数值非法（行级拒绝），第三行正常
    let file = test_helpers::write_fixture(
        dir.path(),
        "rvu_mixed.csv",
        "HCPCS,MOD,WORK RVU\n99213,,1.5\n99214,,abc\n99215,,3.0\n",
    );

    let outcome = api
        .ingest_file(&request("PFS_RVU", file.to_str().unwrap(), "2026A"))
        .await
        .unwrap();

    assert_eq!(outcome.status, VersionStatus::Completed);
    assert_eq!(outcome.report.total_rows, 3);
    assert_eq!(outcome.report.accepted_rows, 2);
    assert_eq!(outcome.report.rejected_rows, 1);
    assert!(outcome
        .report
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::TypeError && i.column.as_deref() == Some("work_rvu")));

    // 问题分组可用于用户展示
    let grouped = outcome.report.rejections_by_kind();
    assert_eq!(
        grouped[&(IssueKind::TypeError, Some("work_rvu".to_string()))],
        1
    );
}

#[tokio::test]
async fn test_duplicate_file_upload_warns() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let content = test_helpers::fee_csv(&[("99213", "", "1.5")]);
    let file = test_helpers::write_fixture(dir.path(), "rvu_q1.csv", &content);

    api.ingest_file(&request("PFS_RVU", file.to_str().unwrap(), "2026A"))
        .await
        .unwrap();

    // 同一文件再次上传为新版本 → 内容哈希告警
    let outcome = api
        .ingest_file(&request("PFS_RVU", file.to_str().unwrap(), "2026B"))
        .await
        .unwrap();
    assert!(outcome
        .report
        .warnings
        .iter()
        .any(|w| w.contains("2026A")));
}

#[tokio::test]
async fn test_batch_ingest_returns_per_file_results() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let good = test_helpers::write_fixture(
        dir.path(),
        "rvu_good.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5")]),
    );
    // 缺必需列的坏文件
    let bad = test_helpers::write_fixture(dir.path(), "rvu_bad.csv", "MOD,WORK RVU\n,1.5\n");

    let results = api
        .ingest_files(&[
            request("PFS_RVU", good.to_str().unwrap(), "2026A"),
            request("PFS_RVU", bad.to_str().unwrap(), "2026B"),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1].as_ref().unwrap_err(), ApiError::Structural(_)));
}

#[tokio::test]
async fn test_ingestion_logs_are_persisted() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let file = test_helpers::write_fixture(
        dir.path(),
        "rvu.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5")]),
    );
    let outcome = api
        .ingest_file(&request("PFS_RVU", file.to_str().unwrap(), "2026A"))
        .await
        .unwrap();

    let logs = api.ingestion_logs(outcome.version_id).unwrap();
    assert!(!logs.is_empty());
    assert!(logs.iter().any(|l| l.message.contains("摄取完成")));
}
