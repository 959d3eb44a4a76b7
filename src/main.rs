// ==========================================
// CMS 参考表数据摄取系统 - 命令行入口
// ==========================================
// 用法:
//   cms-refdata <db> ingest <source_code> <file> <version_label> [variant] [part_index] [part_count]
//   cms-refdata <db> promote <source_code> <version_label> [variant]
//   cms-refdata <db> list <source_code> [variant]
// ==========================================

use cms_refdata::api::{IngestApi, IngestFileRequest};
use std::process::ExitCode;

fn usage() -> ExitCode {
    eprintln!("用法:");
    eprintln!("  cms-refdata <db> ingest <source_code> <file> <version_label> [variant] [part_index] [part_count]");
    eprintln!("  cms-refdata <db> promote <source_code> <version_label> [variant]");
    eprintln!("  cms-refdata <db> list <source_code> [variant]");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    cms_refdata::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", cms_refdata::APP_NAME);
    tracing::info!("系统版本: {}", cms_refdata::VERSION);
    tracing::info!("==================================================");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        return usage();
    }

    let db_path = &args[0];
    let api = match IngestApi::open(db_path) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("初始化失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match args[1].as_str() {
        "ingest" if args.len() >= 5 => {
            let request = IngestFileRequest {
                source_code: args[2].clone(),
                file_path: args[3].clone(),
                version_label: args[4].clone(),
                variant: args.get(5).cloned().filter(|v| !v.is_empty()),
                part_index: args.get(6).and_then(|v| v.parse().ok()),
                declared_part_count: args.get(7).and_then(|v| v.parse().ok()),
            };
            match api.ingest_file(&request).await {
                Ok(outcome) => {
                    println!(
                        "版本 {} [{}]: 共 {} 行, 接受 {}, 拒绝 {}, 分片 {}/{}",
                        request.version_label,
                        outcome.status.to_db_str(),
                        outcome.report.total_rows,
                        outcome.report.accepted_rows,
                        outcome.report.rejected_rows,
                        outcome.assembly.parts_received,
                        outcome.assembly.parts_expected,
                    );
                    for warning in &outcome.report.warnings {
                        println!("告警: {}", warning);
                    }
                    for issue in outcome.report.issues.iter().take(20) {
                        match &issue.row_ref {
                            Some(row_ref) => println!(
                                "问题 [{}] {} @ {}: {}",
                                issue.kind.as_str(),
                                issue.column.as_deref().unwrap_or("-"),
                                row_ref,
                                issue.message
                            ),
                            None => println!("问题 [{}]: {}", issue.kind.as_str(), issue.message),
                        }
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        "promote" if args.len() >= 4 => {
            let variant = args.get(4).cloned().filter(|v| !v.is_empty());
            api.promote_version(&args[2], variant.as_deref(), &args[3])
                .await
                .map(|_| println!("版本 {} 已晋升为 current", args[3]))
        }
        "list" if args.len() >= 3 => {
            let variant = args.get(3).cloned().filter(|v| !v.is_empty());
            match api.list_versions(&args[2], variant.as_deref()) {
                Ok(versions) => {
                    for version in versions {
                        println!(
                            "{} [{}] 行数={} current={} 分片={}/{}",
                            version.key,
                            version.status.to_db_str(),
                            version.record_count,
                            version.is_current,
                            version.parts_received.len(),
                            version.part_count_expected,
                        );
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        _ => return usage(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("失败: {}", e);
            ExitCode::FAILURE
        }
    }
}
