// ==========================================
// CMS 参考表数据摄取系统 - 表头解析器
// ==========================================
// 职责: 在文件前 N 行内定位表头行，并把原始表头映射到规范列
// 算法: 规范化（去空白/大写/压缩内部空白）后与别名精确匹配
// 红线: 不做模糊/编辑距离匹配——表头变体按源逐一枚举
// ==========================================

use crate::domain::source::DataSourceConfig;
use crate::importer::error::{ImportError, ImportResult};
use std::collections::HashMap;

// ==========================================
// 解析结果
// ==========================================

/// 表头解析结果
#[derive(Debug, Clone)]
pub struct HeaderResolution {
    /// 表头所在行（0 起始）
    pub header_row_index: usize,
    /// 规范列名 → 原始列序号
    pub column_index: HashMap<String, usize>,
    /// 未能识别的非空原始表头（告警，不阻断）
    pub unmatched_headers: Vec<String>,
}

impl HeaderResolution {
    /// 数据行从表头行下一行开始
    pub fn data_start_row(&self) -> usize {
        self.header_row_index + 1
    }
}

// ==========================================
// 规范化
// ==========================================

/// 表头规范化: 去首尾空白 + 大写 + 内部空白压缩为单个空格
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// 构建 规范化别名 → 规范列名 的查找表
fn build_alias_map(config: &DataSourceConfig) -> HashMap<String, String> {
    let mut alias_map = HashMap::new();
    for column in &config.columns {
        for alias in &column.source_headers {
            alias_map
                .entry(normalize_header(alias))
                .or_insert_with(|| column.internal_name.clone());
        }
    }
    alias_map
}

// ==========================================
// 表头行探测 + 列映射
// ==========================================

/// 在前 max_scan_rows 行内寻找表头行
///
/// CMS 的表格文件常在真正的表头之上带标题/说明行，
/// 故取第一个“全部必需列都能解析”的行作为表头行。
/// 未识别的多余列记为告警并忽略；必需列缺失是文件级致命错误。
pub fn resolve_headers(
    rows: &[Vec<String>],
    config: &DataSourceConfig,
    max_scan_rows: usize,
) -> ImportResult<HeaderResolution> {
    let alias_map = build_alias_map(config);
    let required: Vec<&str> = config
        .required_columns()
        .filter(|c| !c.source_headers.is_empty()) // 纯派生列没有文件表头
        .map(|c| c.internal_name.as_str())
        .collect();

    let rows_to_scan = max_scan_rows.min(rows.len());

    for (row_idx, row) in rows.iter().take(rows_to_scan).enumerate() {
        let mut column_index: HashMap<String, usize> = HashMap::new();
        let mut matched_cells = vec![false; row.len()];

        for (col_idx, cell) in row.iter().enumerate() {
            let normalized = normalize_header(cell);
            if normalized.is_empty() {
                continue;
            }
            if let Some(internal_name) = alias_map.get(&normalized) {
                // 同一规范列只取第一个命中的单元格
                if !column_index.contains_key(internal_name) {
                    column_index.insert(internal_name.clone(), col_idx);
                    matched_cells[col_idx] = true;
                }
            }
        }

        let required_found = required
            .iter()
            .all(|name| column_index.contains_key(*name));

        if required_found && !column_index.is_empty() {
            let unmatched_headers = row
                .iter()
                .enumerate()
                .filter(|(idx, cell)| !matched_cells[*idx] && !cell.trim().is_empty())
                .map(|(_, cell)| cell.trim().to_string())
                .collect();

            return Ok(HeaderResolution {
                header_row_index: row_idx,
                column_index,
                unmatched_headers,
            });
        }
    }

    Err(ImportError::MissingRequiredHeaders {
        columns: required.iter().map(|s| s.to_string()).collect(),
        scanned_rows: rows_to_scan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_sources::builtin_configs;

    fn rvu_config() -> DataSourceConfig {
        builtin_configs()
            .into_iter()
            .find(|c| c.source_code == "PFS_RVU")
            .unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_exact_match_is_case_and_whitespace_insensitive() {
        let config = rvu_config();
        // 任意大小写 + 填充空白 + 内部多余空白，解析结果一致
        let variants = [
            vec![row(&["HCPCS", "MOD", "WORK RVU"])],
            vec![row(&["hcpcs", "mod", "work rvu"])],
            vec![row(&["  Hcpcs  ", " Mod ", " Work   Rvu "])],
        ];

        for rows in &variants {
            let resolution = resolve_headers(rows, &config, 15).unwrap();
            assert_eq!(resolution.header_row_index, 0);
            assert_eq!(resolution.column_index["hcpcs_code"], 0);
            assert_eq!(resolution.column_index["modifier"], 1);
            assert_eq!(resolution.column_index["work_rvu"], 2);
        }
    }

    #[test]
    fn test_header_row_detection_skips_preamble() {
        let config = rvu_config();
        let rows = vec![
            row(&["Medicare Physician Fee Schedule", "", ""]),
            row(&["2026 Annual Release", "", ""]),
            row(&[]),
            row(&["HCPCS", "MOD", "WORK RVU"]),
            row(&["99213", "", "1.5"]),
        ];

        let resolution = resolve_headers(&rows, &config, 15).unwrap();
        assert_eq!(resolution.header_row_index, 3);
        assert_eq!(resolution.data_start_row(), 4);
    }

    #[test]
    fn test_missing_required_header_is_fatal() {
        let config = rvu_config();
        // 缺少 HCPCS（必需列）
        let rows = vec![row(&["MOD", "WORK RVU"]), row(&["", "1.5"])];

        let err = resolve_headers(&rows, &config, 15).unwrap_err();
        match err {
            ImportError::MissingRequiredHeaders { columns, .. } => {
                assert!(columns.contains(&"hcpcs_code".to_string()));
            }
            other => panic!("期望 MissingRequiredHeaders，实际 {:?}", other),
        }
    }

    #[test]
    fn test_unknown_extra_columns_are_warnings_not_failures() {
        let config = rvu_config();
        let rows = vec![row(&["HCPCS", "MOD", "WORK RVU", "INTERNAL NOTES"])];

        let resolution = resolve_headers(&rows, &config, 15).unwrap();
        assert_eq!(resolution.unmatched_headers, vec!["INTERNAL NOTES"]);
    }

    #[test]
    fn test_no_fuzzy_matching() {
        let config = rvu_config();
        // "HCPC CODE" 不在别名表中（有 "HCPCS CODE"/"HCPC"），精确匹配必须拒绝
        let rows = vec![row(&["HCPC CODE", "MOD", "WORK RVU"])];
        assert!(resolve_headers(&rows, &config, 15).is_err());
    }

    #[test]
    fn test_scan_window_respected() {
        let config = rvu_config();
        let mut rows = vec![row(&["preamble", "", ""]); 20];
        rows.push(row(&["HCPCS", "MOD", "WORK RVU"]));

        // 表头在第 21 行，窗口 15 行内找不到
        assert!(resolve_headers(&rows, &config, 15).is_err());
        // 放大窗口后可以找到
        assert!(resolve_headers(&rows, &config, 30).is_ok());
    }
}
