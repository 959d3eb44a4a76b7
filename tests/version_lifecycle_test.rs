// ==========================================
// 版本生命周期测试
// ==========================================
// 测试目标: 多分片装配、跨分片查重、晋升约束、终态不可变、超时失效
// ==========================================


use cms_refdata::api::{ApiError, IngestFileRequest};
use cms_refdata::config::config_keys;
use cms_refdata::domain::report::IssueKind;
use cms_refdata::domain::version::VersionStatus;
use cms_refdata::logging;

fn part_request(
    source: &str,
    file: &str,
    label: &str,
    part_index: i64,
    declared: i64,
) -> IngestFileRequest {
    IngestFileRequest {
        source_code: source.to_string(),
        variant: None,
        version_label: label.to_string(),
        part_index: Some(part_index),
        declared_part_count: Some(declared),
        file_path: file.to_string(),
    }
}

/// 生成 5 行互不重复的费用 CSV，code 段用于区分分片
fn five_rows(prefix: u32) -> String {
    let rows: Vec<(String, String, String)> = (0..5)
        .map(|i| (format!("{}{:02}", prefix, i), String::new(), format!("{}.5", i)))
        .collect();
    let borrowed: Vec<(&str, &str, &str)> = rows
        .iter()
        .map(|(a, b, c)| (a.as_str(), b.as_str(), c.as_str()))
        .collect();
    test_helpers::fee_csv(&borrowed)
}

#[tokio::test]
async fn test_two_part_version_completes_with_total_count() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    api.register_source(test_helpers::multipart_fee_source())
        .unwrap();
    let dir = test_helpers::fixture_dir();

    let part1 = test_helpers::write_fixture(dir.path(), "fee_p1.csv", &five_rows(100));
    let part2 = test_helpers::write_fixture(dir.path(), "fee_p2.csv", &five_rows(200));

    // 分片 1/2: 版本进入 PROCESSING，未完整
    let outcome = api
        .ingest_file(&part_request("TEST_FEE", part1.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Processing);
    assert_eq!(outcome.assembly.parts_received, 1);
    assert_eq!(outcome.assembly.parts_expected, 2);
    assert!(!outcome.assembly.complete);

    // 不完整版本不能晋升
    let err = api
        .promote_version("TEST_FEE", None, "2026Q1")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::VersionNotCompleted { .. }));

    // 分片 2/2: 定稿，record_count 为两分片之和
    let outcome = api
        .ingest_file(&part_request("TEST_FEE", part2.to_str().unwrap(), "2026Q1", 2, 2))
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Completed);
    assert!(outcome.assembly.complete);

    let version = &api.list_versions("TEST_FEE", None).unwrap()[0];
    assert_eq!(version.record_count, 10);
    assert_eq!(version.parts_received, vec![1, 2]);

    api.promote_version("TEST_FEE", None, "2026Q1").await.unwrap();
}

#[tokio::test]
async fn test_out_of_order_parts_assemble() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    api.register_source(test_helpers::multipart_fee_source())
        .unwrap();
    let dir = test_helpers::fixture_dir();

    let part1 = test_helpers::write_fixture(dir.path(), "fee_p1.csv", &five_rows(100));
    let part2 = test_helpers::write_fixture(dir.path(), "fee_p2.csv", &five_rows(200));

    // 先交 2 号分片，再交 1 号——完整性只看集合
    let outcome = api
        .ingest_file(&part_request("TEST_FEE", part2.to_str().unwrap(), "2026Q1", 2, 2))
        .await
        .unwrap();
    assert!(!outcome.assembly.complete);

    let outcome = api
        .ingest_file(&part_request("TEST_FEE", part1.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Completed);
}

#[tokio::test]
async fn test_part_count_disagreement_is_rejected() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    api.register_source(test_helpers::multipart_fee_source())
        .unwrap();
    let dir = test_helpers::fixture_dir();

    let part1 = test_helpers::write_fixture(dir.path(), "fee_p1.csv", &five_rows(100));
    let part2 = test_helpers::write_fixture(dir.path(), "fee_p2.csv", &five_rows(200));

    api.ingest_file(&part_request("TEST_FEE", part1.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();

    // 第二个分片申报 3 与首个分片固定的 2 不一致
    let err = api
        .ingest_file(&part_request("TEST_FEE", part2.to_str().unwrap(), "2026Q1", 2, 3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::PartCountMismatch { expected: 2, declared: 3, .. }
    ));
}

#[tokio::test]
async fn test_part_resubmission_replaces_rows() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    api.register_source(test_helpers::multipart_fee_source())
        .unwrap();
    let dir = test_helpers::fixture_dir();

    let part1_a = test_helpers::write_fixture(dir.path(), "fee_p1a.csv", &five_rows(100));
    let part1_b = test_helpers::write_fixture(
        dir.path(),
        "fee_p1b.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5"), ("99214", "", "2.0"), ("99215", "", "3.0")]),
    );
    let part2 = test_helpers::write_fixture(dir.path(), "fee_p2.csv", &five_rows(200));

    api.ingest_file(&part_request("TEST_FEE", part1_a.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();

    // 重传 1 号分片（幂等重试）: 第二次的行整体生效，不叠加
    let outcome = api
        .ingest_file(&part_request("TEST_FEE", part1_b.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();
    assert_eq!(outcome.assembly.parts_received, 1);

    let outcome = api
        .ingest_file(&part_request("TEST_FEE", part2.to_str().unwrap(), "2026Q1", 2, 2))
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Completed);

    // 3 (重传后的分片1) + 5 (分片2)
    let version = &api.list_versions("TEST_FEE", None).unwrap()[0];
    assert_eq!(version.record_count, 8);
}

#[tokio::test]
async fn test_cross_part_duplicate_fails_version() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    api.register_source(test_helpers::multipart_fee_source())
        .unwrap();
    let dir = test_helpers::fixture_dir();

    // 两个分片都含 (99213, NULL 修饰符)——单分片内各自无重复
    let part1 = test_helpers::write_fixture(
        dir.path(),
        "fee_p1.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5"), ("99214", "", "2.0")]),
    );
    let part2 = test_helpers::write_fixture(
        dir.path(),
        "fee_p2.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.7"), ("99215", "", "3.0")]),
    );

    api.ingest_file(&part_request("TEST_FEE", part1.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();
    let outcome = api
        .ingest_file(&part_request("TEST_FEE", part2.to_str().unwrap(), "2026Q1", 2, 2))
        .await
        .unwrap();

    // 装配完成时的跨分片查重发现重复 → FAILED 而非 COMPLETED
    assert_eq!(outcome.status, VersionStatus::Failed);
    assert!(outcome
        .report
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::CrossPartDuplicate && i.message.contains("99213")));

    let err = api
        .promote_version("TEST_FEE", None, "2026Q1")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::VersionNotCompleted { .. }));
}

#[tokio::test]
async fn test_terminal_version_rejects_further_parts() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let file = test_helpers::write_fixture(
        dir.path(),
        "rvu.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5")]),
    );
    let again = test_helpers::write_fixture(
        dir.path(),
        "rvu_late.csv",
        &test_helpers::fee_csv(&[("99216", "", "4.0")]),
    );

    // 单分片源立即定稿
    let outcome = api
        .ingest_file(&IngestFileRequest {
            source_code: "PFS_RVU".to_string(),
            variant: None,
            version_label: "2026A".to_string(),
            part_index: None,
            declared_part_count: None,
            file_path: file.to_str().unwrap().to_string(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Completed);

    // 终态版本拒绝再收分片
    let err = api
        .ingest_file(&IngestFileRequest {
            source_code: "PFS_RVU".to_string(),
            variant: None,
            version_label: "2026A".to_string(),
            part_index: Some(1),
            declared_part_count: None,
            file_path: again.to_str().unwrap().to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::VersionClosed { .. }));
}

#[tokio::test]
async fn test_delete_failed_version_frees_label() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    api.register_source(test_helpers::multipart_fee_source())
        .unwrap();
    let dir = test_helpers::fixture_dir();

    let dup1 = test_helpers::write_fixture(
        dir.path(),
        "fee_p1.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.5")]),
    );
    let dup2 = test_helpers::write_fixture(
        dir.path(),
        "fee_p2.csv",
        &test_helpers::fee_csv(&[("99213", "", "1.7")]),
    );

    api.ingest_file(&part_request("TEST_FEE", dup1.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();
    let outcome = api
        .ingest_file(&part_request("TEST_FEE", dup2.to_str().unwrap(), "2026Q1", 2, 2))
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Failed);

    // 终态不可变——重新摄取需要删除失败版本释放标签
    assert!(api
        .delete_failed_version("TEST_FEE", None, "2026Q1")
        .unwrap());

    let good2 = test_helpers::write_fixture(dir.path(), "fee_p2_fix.csv", &five_rows(200));
    api.ingest_file(&part_request("TEST_FEE", dup1.to_str().unwrap(), "2026Q1", 1, 2))
        .await
        .unwrap();
    let outcome = api
        .ingest_file(&part_request("TEST_FEE", good2.to_str().unwrap(), "2026Q1", 2, 2))
        .await
        .unwrap();
    assert_eq!(outcome.status, VersionStatus::Completed);
}

#[tokio::test]
async fn test_stalled_version_times_out_without_touching_current() {
    logging::init_test();
    let (_db, db_path, api) = test_helpers::create_test_api().unwrap();
    api.register_source(test_helpers::multipart_fee_source())
        .unwrap();
    let dir = test_helpers::fixture_dir();

    // 先建立一个 current 版本
    let base = test_helpers::write_fixture(dir.path(), "fee_base.csv", &five_rows(100));
    api.ingest_file(&part_request("TEST_FEE", base.to_str().unwrap(), "2026Q1", 1, 1))
        .await
        .unwrap();
    api.promote_version("TEST_FEE", None, "2026Q1").await.unwrap();

    // 新版本只交了 1/2 个分片
    let part1 = test_helpers::write_fixture(dir.path(), "fee_p1.csv", &five_rows(300));
    api.ingest_file(&part_request("TEST_FEE", part1.to_str().unwrap(), "2026Q2", 1, 2))
        .await
        .unwrap();

    // 把等待上限压到 0 秒并等待 1 个整秒，下一次摄取前的清扫会将其失效
    {
        let conn = std::sync::Arc::new(std::sync::Mutex::new(
            test_helpers::open_raw_connection(&db_path),
        ));
        let settings = cms_refdata::config::ConfigManager::from_connection(conn).unwrap();
        settings
            .set_config_value(config_keys::MAX_PART_WAIT_SECS, "0")
            .unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    // 超时后的分片提交被拒（清扫已将版本置为 FAILED）
    let part2 = test_helpers::write_fixture(dir.path(), "fee_p2.csv", &five_rows(400));
    let err = api
        .ingest_file(&part_request("TEST_FEE", part2.to_str().unwrap(), "2026Q2", 2, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::VersionClosed { .. }));

    // 旧 current 原地不动
    let current = api.current_version("TEST_FEE", None).unwrap().unwrap();
    assert_eq!(current.key.version_label, "2026Q1");
    assert_eq!(current.status, VersionStatus::Completed);
}

#[tokio::test]
async fn test_variants_version_independently() {
    logging::init_test();
    let (_db, _path, api) = test_helpers::create_test_api().unwrap();
    let dir = test_helpers::fixture_dir();

    let content = "\
Column 1,Column 2,Modifier,Effective Date\n\
99213,36415,1,20260101\n";
    let hosp = test_helpers::write_fixture(dir.path(), "ptp_hosp.csv", content);
    let prac = test_helpers::write_fixture(dir.path(), "ptp_prac.csv", content);

    for (variant, file) in [("hospital", &hosp), ("practitioner", &prac)] {
        let outcome = api
            .ingest_file(&IngestFileRequest {
                source_code: "NCCI_PTP".to_string(),
                variant: Some(variant.to_string()),
                version_label: "2026Q1".to_string(),
                part_index: Some(1),
                declared_part_count: Some(1),
                file_path: file.to_str().unwrap().to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, VersionStatus::Completed);
    }

    // 每个变体各自晋升，current 互不影响
    api.promote_version("NCCI_PTP", Some("hospital"), "2026Q1")
        .await
        .unwrap();
    assert!(api
        .current_version("NCCI_PTP", Some("hospital"))
        .unwrap()
        .is_some());
    assert!(api
        .current_version("NCCI_PTP", Some("practitioner"))
        .unwrap()
        .is_none());
}
