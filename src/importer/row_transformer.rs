// ==========================================
// CMS 参考表数据摄取系统 - 行转换器
// ==========================================
// 职责: 原始记录 + 表头映射 → 类型化校验行
// 顺序: 取值(空→NULL) → 特殊值规则 → 类型转换 → 派生列 → 必填校验
// 红线: 行级失败只丢弃该行并计数，绝不中断整个文件
// ==========================================

use crate::domain::report::{IssueKind, ValidationIssue};
use crate::domain::row::{CellValue, DataRow, RowRef};
use crate::domain::source::{
    CanonicalColumn, DataSourceConfig, DataType, DerivedColumnRule, SpecialValueRule,
};
use crate::importer::header_resolver::HeaderResolution;
use crate::importer::transformers;
use std::collections::HashSet;

// ==========================================
// RowTransformer - 行转换器（无状态，可并行）
// ==========================================
pub struct RowTransformer;

impl RowTransformer {
    /// 转换一行
    ///
    /// 返回 (Some(行) 或 None, 行级问题列表)。
    /// None 表示该行被丢弃；调用方继续处理后续行。
    pub fn transform(
        raw_row: &[String],
        resolution: &HeaderResolution,
        config: &DataSourceConfig,
        row_ref: &RowRef,
    ) -> (Option<DataRow>, Vec<ValidationIssue>) {
        let mut row = DataRow::new(row_ref.clone());
        let mut issues = Vec::new();
        // 转换失败的列集合（派生规则据此跳过）
        let mut failed_columns: HashSet<String> = HashSet::new();

        // === 逐列: 取值 → 特殊值规则 → 类型转换 ===
        for column in &config.columns {
            let raw = resolution
                .column_index
                .get(&column.internal_name)
                .and_then(|idx| raw_row.get(*idx))
                .map(|cell| cell.trim())
                .unwrap_or("");

            let value = Self::transform_cell(raw, column, config, row_ref, &mut issues);
            match value {
                Some(cell) => row.set(&column.internal_name, cell),
                None => {
                    failed_columns.insert(column.internal_name.clone());
                    row.set(&column.internal_name, CellValue::Null);
                }
            }
        }

        // === 派生列 ===
        Self::apply_derived_rules(&mut row, config, &failed_columns, row_ref, &mut issues);

        // === 必填列非空校验 ===
        for column in config.required_columns() {
            if row.get(&column.internal_name).is_null()
                && !failed_columns.contains(&column.internal_name)
            {
                issues.push(ValidationIssue::row(
                    row_ref.clone(),
                    &column.internal_name,
                    IssueKind::MissingRequiredValue,
                    format!("必填列 {} 为空", column.internal_name),
                ));
            }
        }

        // 有任一行级问题即丢弃该行（问题已全部记录）
        if issues.is_empty() {
            (Some(row), issues)
        } else {
            (None, issues)
        }
    }

    /// 单列转换: 特殊值规则优先，余下按声明类型转换
    ///
    /// 返回 None 表示转换失败（问题已写入 issues）；
    /// 合法的 NULL 返回 Some(CellValue::Null)。
    fn transform_cell(
        raw: &str,
        column: &CanonicalColumn,
        config: &DataSourceConfig,
        row_ref: &RowRef,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<CellValue> {
        // 步骤 1: 空白/缺失记号 → NULL
        if transformers::is_null_marker(raw) {
            return Some(CellValue::Null);
        }

        // 步骤 2: 特殊值规则
        match &column.special_rule {
            Some(SpecialValueRule::AsteriskMeansNull) if raw == "*" => {
                return Some(CellValue::Null);
            }
            Some(SpecialValueRule::AsteriskMeansTrue) => {
                return Some(CellValue::Boolean(raw == "*"));
            }
            Some(SpecialValueRule::ZeroIsMeaningful) if raw == "0" => {
                // 0 是有效值，显式短路，杜绝按缺失处理
                return Some(match column.data_type {
                    DataType::Numeric => CellValue::Numeric(0.0),
                    _ => CellValue::Integer(0),
                });
            }
            Some(SpecialValueRule::LeadingDigitIndicator { valid }) => {
                return match transformers::first_digit_indicator(raw, valid) {
                    Some(digit) => Some(CellValue::Integer(digit)),
                    None => {
                        issues.push(Self::coercion_issue(
                            column, config, row_ref,
                            IssueKind::SpecialValue,
                            format!("指示符 '{}' 不在合法值 {:?} 内", raw, valid),
                        ));
                        None
                    }
                };
            }
            _ => {}
        }

        // 步骤 3: 按声明类型转换
        let converted = match column.data_type {
            DataType::Text => {
                let cleaned = if column.is_code_column() {
                    transformers::clean_code(raw)
                } else {
                    transformers::clean_text(raw)
                };
                return Some(cleaned.map(CellValue::Text).unwrap_or(CellValue::Null));
            }
            DataType::Integer => transformers::parse_integer(raw).map(CellValue::Integer),
            DataType::Numeric => transformers::parse_numeric(raw).map(CellValue::Numeric),
            DataType::Date => {
                // '*' 与缺失记号在日期/数值解析里本身就映射为 None，不算失败
                if raw == "*" {
                    return Some(CellValue::Null);
                }
                transformers::parse_date(raw).map(CellValue::Date)
            }
            DataType::Boolean => transformers::parse_boolean(raw).map(CellValue::Boolean),
        };

        match converted {
            Some(cell) => Some(cell),
            None => {
                issues.push(Self::coercion_issue(
                    column, config, row_ref,
                    IssueKind::TypeError,
                    format!(
                        "'{}' 无法转换为 {}",
                        raw,
                        column.data_type.to_db_str()
                    ),
                ));
                None
            }
        }
    }

    fn coercion_issue(
        column: &CanonicalColumn,
        config: &DataSourceConfig,
        row_ref: &RowRef,
        kind: IssueKind,
        detail: String,
    ) -> ValidationIssue {
        // 唯一键列的转换失败对该行是致命的，消息中标出
        let message = if config.is_unique_key(&column.internal_name) {
            format!("{} (唯一键列)", detail)
        } else {
            detail
        };
        ValidationIssue::row(row_ref.clone(), &column.internal_name, kind, message)
    }

    /// 派生列计算
    ///
    /// 输入列转换失败时跳过并标记，绝不用未转换的原始值计算。
    fn apply_derived_rules(
        row: &mut DataRow,
        config: &DataSourceConfig,
        failed_columns: &HashSet<String>,
        row_ref: &RowRef,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for rule in &config.derived_rules {
            // 文件已提供目标列值时不覆盖
            if !row.get(rule.target()).is_null() {
                continue;
            }

            let failed_input = rule
                .inputs()
                .iter()
                .find(|input| failed_columns.contains(**input))
                .map(|s| s.to_string());
            if let Some(input) = failed_input {
                issues.push(ValidationIssue::row(
                    row_ref.clone(),
                    rule.target(),
                    IssueKind::SpecialValue,
                    format!("派生列 {} 跳过: 输入列 {} 转换失败", rule.target(), input),
                ));
                continue;
            }

            match rule {
                DerivedColumnRule::ConcatColumns { target, left, right } => {
                    if let (CellValue::Text(l), CellValue::Text(r)) =
                        (row.get(left).clone(), row.get(right).clone())
                    {
                        row.set(target, CellValue::Text(format!("{}{}", l, r)));
                    }
                }
                DerivedColumnRule::LeadingIntegerToken { target, from, valid } => {
                    if let CellValue::Text(text) = row.get(from).clone() {
                        match transformers::leading_integer_token(&text, valid) {
                            Some(token) => row.set(target, CellValue::Integer(token)),
                            None => issues.push(ValidationIssue::row(
                                row_ref.clone(),
                                target,
                                IssueKind::SpecialValue,
                                format!("无法从 '{}' 提取 {} 的前导整数", text, target),
                            )),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_sources::builtin_configs;
    use crate::importer::header_resolver::resolve_headers;

    fn config_of(code: &str) -> DataSourceConfig {
        builtin_configs()
            .into_iter()
            .find(|c| c.source_code == code)
            .unwrap()
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn row_ref(line: usize) -> RowRef {
        RowRef {
            file_name: "test.csv".to_string(),
            line_number: line,
        }
    }

    #[test]
    fn test_pfs_rvu_basic_row() {
        let config = config_of("PFS_RVU");
        let table = rows(&[&["HCPCS", "MOD", "WORK RVU"], &["99213", "", "1.5"]]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        let (row, issues) =
            RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert!(issues.is_empty());

        let row = row.expect("行应被接受");
        assert_eq!(row.get("hcpcs_code"), &CellValue::Text("99213".to_string()));
        assert_eq!(row.get("modifier"), &CellValue::Null);
        assert_eq!(row.get("work_rvu"), &CellValue::Numeric(1.5));
    }

    #[test]
    fn test_type_error_drops_row_but_is_recorded() {
        let config = config_of("PFS_RVU");
        let table = rows(&[&["HCPCS", "MOD", "WORK RVU"], &["99213", "", "abc"]]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        let (row, issues) =
            RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert!(row.is_none());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::TypeError);
        assert_eq!(issues[0].column.as_deref(), Some("work_rvu"));
    }

    #[test]
    fn test_missing_required_value_drops_row() {
        let config = config_of("PFS_RVU");
        let table = rows(&[&["HCPCS", "MOD", "WORK RVU"], &["", "26", "1.5"]]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        let (row, issues) =
            RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert!(row.is_none());
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::MissingRequiredValue
                && i.column.as_deref() == Some("hcpcs_code")));
    }

    #[test]
    fn test_ncci_ptp_special_values() {
        let config = config_of("NCCI_PTP");
        let table = rows(&[
            &[
                "Column 1",
                "Column 2",
                "Modifier",
                "Effective Date",
                "Deletion Date",
                "PTP Edit Rationale",
                "*=in existence prior to 1996",
            ],
            &["99213", "36415", "1", "20260101", "*", "Misuse of column two", "*"],
            &["10021", "10004", "0", "20260101", "20260401", "CPT Manual coding", ""],
        ]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        // '*' 删除日期 → NULL；'*' 1996前标志 → true
        let (row, issues) =
            RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert!(issues.is_empty(), "{:?}", issues);
        let row = row.unwrap();
        assert_eq!(row.get("deletion_date"), &CellValue::Null);
        assert_eq!(row.get("prior_1996_flag"), &CellValue::Boolean(true));
        assert_eq!(row.get("modifier_indicator"), &CellValue::Integer(1));

        // 真实删除日期 → Date；空 1996 标志 → false
        let (row, issues) =
            RowTransformer::transform(&table[2], &resolution, &config, &row_ref(3));
        assert!(issues.is_empty());
        let row = row.unwrap();
        assert_eq!(
            row.get("deletion_date"),
            &CellValue::Date(chrono::NaiveDate::from_ymd_opt(2026, 4, 1).unwrap())
        );
        // 空单元格是 NULL，不经过特殊值规则
        assert_eq!(row.get("prior_1996_flag"), &CellValue::Null);
        assert_eq!(row.get("modifier_indicator"), &CellValue::Integer(0));
    }

    #[test]
    fn test_modifier_indicator_rejects_invalid_digit() {
        let config = config_of("NCCI_PTP");
        let table = rows(&[
            &["Column 1", "Column 2", "Modifier", "Effective Date"],
            &["99213", "36415", "5", "20260101"],
        ]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        let (row, issues) =
            RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert!(row.is_none());
        assert!(issues.iter().any(|i| i.kind == IssueKind::SpecialValue));
    }

    #[test]
    fn test_mue_zero_preserved_and_mai_derived() {
        let config = config_of("NCCI_MUE_DME");
        let table = rows(&[
            &[
                "HCPCS/CPT Code",
                "DME Supplier Services MUE Values",
                "MUE Adjudication Indicator",
                "MUE Rationale",
            ],
            &["E0100", "0", "3 Date of Service Edit: Clinical", "Nature of Equipment"],
            &["E0105", "2", "1 Line Edit", "CMS Policy"],
        ]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        // MUE 值 0 必须存为 0，不是 NULL
        let (row, issues) =
            RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert!(issues.is_empty());
        let row = row.unwrap();
        assert_eq!(row.get("mue_value"), &CellValue::Integer(0));
        assert_eq!(row.get("mai_id"), &CellValue::Integer(3));

        let (row, _) =
            RowTransformer::transform(&table[2], &resolution, &config, &row_ref(3));
        let row = row.unwrap();
        assert_eq!(row.get("mue_value"), &CellValue::Integer(2));
        assert_eq!(row.get("mai_id"), &CellValue::Integer(1));
    }

    #[test]
    fn test_mac_locality_concat_derivation() {
        let config = config_of("PFS_LOCALITY");
        let table = rows(&[
            &["STATE", "COUNTY CODE", "COUNTY", "CARRIER", "LOCALITY"],
            &["CA", "037", "LOS ANGELES", "01182", "18"],
        ]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        let (row, issues) =
            RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert!(issues.is_empty());
        let row = row.unwrap();
        // mac_locality = carrier_number || locality_code
        assert_eq!(
            row.get("mac_locality"),
            &CellValue::Text("0118218".to_string())
        );
    }

    #[test]
    fn test_code_columns_uppercased() {
        let config = config_of("PFS_RVU");
        let table = rows(&[&["HCPCS", "MOD", "WORK RVU"], &["g0008", "", "0.2"]]);
        let resolution = resolve_headers(&table, &config, 15).unwrap();

        let (row, _) = RowTransformer::transform(&table[1], &resolution, &config, &row_ref(2));
        assert_eq!(
            row.unwrap().get("hcpcs_code"),
            &CellValue::Text("G0008".to_string())
        );
    }
}
