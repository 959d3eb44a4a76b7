// ==========================================
// CMS 参考表数据摄取系统 - 内置数据源目录
// ==========================================
// 职责: 十个 CMS 公开数据源的种子配置（规范列/表头别名/特殊值规则/派生规则）
// 说明: 仅是首次建库的种子数据；运行期新增数据源走配置表注册，不改代码
// ==========================================

use crate::domain::source::{
    CanonicalColumn, DataSourceConfig, DataType, DerivedColumnRule, SpecialValueRule,
};

fn col(
    internal_name: &str,
    display_name: &str,
    data_type: DataType,
    is_required: bool,
    source_headers: &[&str],
    display_order: i32,
) -> CanonicalColumn {
    CanonicalColumn {
        internal_name: internal_name.to_string(),
        display_name: display_name.to_string(),
        data_type,
        is_required,
        source_headers: source_headers.iter().map(|h| h.to_string()).collect(),
        special_rule: None,
        display_order,
    }
}

fn col_with_rule(
    internal_name: &str,
    display_name: &str,
    data_type: DataType,
    is_required: bool,
    source_headers: &[&str],
    display_order: i32,
    rule: SpecialValueRule,
) -> CanonicalColumn {
    let mut column = col(
        internal_name,
        display_name,
        data_type,
        is_required,
        source_headers,
        display_order,
    );
    column.special_rule = Some(rule);
    column
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// MUE 三个供方类别共用的列定义（MUE 值列的表头因类别而异）
fn mue_source(
    source_code: &str,
    source_name: &str,
    description: &str,
    mue_value_headers: &[&str],
    display_order: i32,
) -> DataSourceConfig {
    DataSourceConfig {
        source_code: source_code.to_string(),
        source_name: source_name.to_string(),
        category: "NCCI Edits".to_string(),
        description: description.to_string(),
        target_table: "ncci_mue".to_string(),
        update_frequency: "QUARTERLY".to_string(),
        display_order,
        columns: vec![
            col(
                "hcpcs_code",
                "HCPCS Code",
                DataType::Text,
                true,
                &["HCPCS/CPT Code", "HCPCS Code", "CPT/HCPCS Code", "HCPCS", "CPT Code"],
                10,
            ),
            col_with_rule(
                "mue_value",
                "MUE Value",
                DataType::Integer,
                true,
                mue_value_headers,
                20,
                // 0 表示“该供方类别不可计费”，是有效限额
                SpecialValueRule::ZeroIsMeaningful,
            ),
            // mai_id 纯派生列，源文件中没有独立表头
            col("mai_id", "MAI ID", DataType::Integer, false, &[], 30),
            col(
                "mai_description",
                "MAI Description",
                DataType::Text,
                true,
                &["MUE Adjudication Indicator", "MAI", "Adjudication Indicator"],
                40,
            ),
            col(
                "mue_rationale",
                "MUE Rationale",
                DataType::Text,
                false,
                &["MUE Rationale", "Rationale", "MUE Rationale Code"],
                50,
            ),
        ],
        unique_keys: strings(&["hcpcs_code"]),
        derived_rules: vec![DerivedColumnRule::LeadingIntegerToken {
            target: "mai_id".to_string(),
            from: "mai_description".to_string(),
            valid: vec![1, 2, 3],
        }],
        multi_part: false,
        variants: vec![],
    }
}

/// 内置数据源目录
pub fn builtin_configs() -> Vec<DataSourceConfig> {
    vec![
        // ==========================================
        // Physician Fee Schedule
        // ==========================================
        DataSourceConfig {
            source_code: "PFS_RVU".to_string(),
            source_name: "PFS - Relative Value Units".to_string(),
            category: "Physician Fee Schedule".to_string(),
            description: "HCPCS 代码的基础 RVU 值、状态码与政策指示符".to_string(),
            target_table: "pfs_rvu".to_string(),
            update_frequency: "QUARTERLY".to_string(),
            display_order: 10,
            columns: vec![
                col(
                    "hcpcs_code",
                    "HCPCS Code",
                    DataType::Text,
                    true,
                    &["HCPCS", "HCPC", "CPT", "HCPCS CODE", "PROCEDURE CODE"],
                    10,
                ),
                col("modifier", "Modifier", DataType::Text, false, &["MOD", "MODIFIER", "MOD."], 20),
                col(
                    "description",
                    "Description",
                    DataType::Text,
                    false,
                    &["DESCRIPTION", "DESC", "DESCRIPTOR", "SHORT DESCRIPTION"],
                    30,
                ),
                col(
                    "status_code",
                    "Status Code",
                    DataType::Text,
                    false,
                    &["STATUS CODE", "STATUS", "STAT", "STS"],
                    40,
                ),
                col(
                    "work_rvu",
                    "Work RVU",
                    DataType::Numeric,
                    false,
                    &["WORK RVU", "WORK_RVU", "WRVU", "PHYSICIAN WORK"],
                    50,
                ),
                col(
                    "non_fac_pe_rvu",
                    "Non-Facility PE RVU",
                    DataType::Numeric,
                    false,
                    &[
                        "NON-FAC PE RVU",
                        "NON-FACILITY PE RVU",
                        "NFPE RVU",
                        "NON FAC PE RVU",
                        "FULLY IMPL NON-FAC PE RVUS",
                    ],
                    60,
                ),
                col(
                    "facility_pe_rvu",
                    "Facility PE RVU",
                    DataType::Numeric,
                    false,
                    &[
                        "FAC PE RVU",
                        "FACILITY PE RVU",
                        "FPE RVU",
                        "FAC_PE_RVU",
                        "FULLY IMPL FAC PE RVUS",
                    ],
                    70,
                ),
                col(
                    "mp_rvu",
                    "Malpractice RVU",
                    DataType::Numeric,
                    false,
                    &["MP RVU", "MALPRACTICE RVU", "MAL PRAC RVU", "MPRVU", "MALPRACTICE"],
                    80,
                ),
                col(
                    "non_fac_total",
                    "Non-Facility Total",
                    DataType::Numeric,
                    false,
                    &["NON-FAC TOTAL", "NON-FACILITY TOTAL", "NF TOTAL"],
                    90,
                ),
                col(
                    "facility_total",
                    "Facility Total",
                    DataType::Numeric,
                    false,
                    &["FAC TOTAL", "FACILITY TOTAL", "FAC_TOTAL"],
                    100,
                ),
                col(
                    "pctc_indicator",
                    "PC/TC Indicator",
                    DataType::Text,
                    false,
                    &["PCTC IND", "PC/TC IND", "PCTC INDICATOR", "PC/TC INDICATOR"],
                    110,
                ),
                col(
                    "global_days",
                    "Global Period",
                    DataType::Text,
                    false,
                    &["GLOB DAYS", "GLOBAL DAYS", "GLOBAL PERIOD", "GLOB"],
                    120,
                ),
                col(
                    "conversion_factor",
                    "Conversion Factor",
                    DataType::Numeric,
                    false,
                    &["CONV FACTOR", "CF", "CONVERSION FACTOR", "GPCI CF"],
                    130,
                ),
            ],
            unique_keys: strings(&["hcpcs_code", "modifier"]),
            derived_rules: vec![],
            multi_part: false,
            variants: vec![],
        },
        DataSourceConfig {
            source_code: "PFS_GPCI".to_string(),
            source_name: "PFS - Geographic Practice Cost Index".to_string(),
            category: "Physician Fee Schedule".to_string(),
            description: "按地区的地理调整系数 (Work/PE/MP)".to_string(),
            target_table: "pfs_gpci".to_string(),
            update_frequency: "ANNUAL".to_string(),
            display_order: 20,
            columns: vec![
                col(
                    "mac_locality",
                    "MAC Locality",
                    DataType::Text,
                    true,
                    &["MAC LOCALITY", "LOCALITY", "CARRIER LOCALITY", "MAC/LOCALITY"],
                    10,
                ),
                col(
                    "locality_name",
                    "Locality Name",
                    DataType::Text,
                    false,
                    &["LOCALITY NAME", "NAME", "LOCALITY DESCRIPTION"],
                    20,
                ),
                col(
                    "work_gpci",
                    "Work GPCI",
                    DataType::Numeric,
                    true,
                    &["WORK GPCI", "PW GPCI", "WORK", "PHYSICIAN WORK GPCI"],
                    30,
                ),
                col(
                    "pe_gpci",
                    "PE GPCI",
                    DataType::Numeric,
                    true,
                    &["PE GPCI", "PRACTICE EXPENSE GPCI", "PE", "PRACTICE EXPENSE"],
                    40,
                ),
                col(
                    "mp_gpci",
                    "MP GPCI",
                    DataType::Numeric,
                    true,
                    &["MP GPCI", "MALPRACTICE GPCI", "MP", "PLI GPCI"],
                    50,
                ),
            ],
            unique_keys: strings(&["mac_locality"]),
            derived_rules: vec![],
            multi_part: false,
            variants: vec![],
        },
        DataSourceConfig {
            source_code: "PFS_LOCALITY".to_string(),
            source_name: "PFS - Locality Mapping".to_string(),
            category: "Physician Fee Schedule".to_string(),
            description: "州/县 → MAC 地区映射".to_string(),
            target_table: "pfs_locality".to_string(),
            update_frequency: "ANNUAL".to_string(),
            display_order: 30,
            columns: vec![
                col("state_code", "State Code", DataType::Text, true, &["STATE", "STATE CODE", "ST"], 10),
                col(
                    "county_code",
                    "County Code",
                    DataType::Text,
                    false,
                    &["COUNTY CODE", "FIPS", "FIPS CODE"],
                    20,
                ),
                col("county_name", "County Name", DataType::Text, false, &["COUNTY", "COUNTY NAME"], 30),
                col(
                    "carrier_number",
                    "Carrier Number",
                    DataType::Text,
                    true,
                    &["CARRIER", "CARRIER NUMBER", "MAC", "MAC NUMBER"],
                    40,
                ),
                col(
                    "locality_code",
                    "Locality Code",
                    DataType::Text,
                    true,
                    &["LOCALITY", "LOCALITY CODE", "LOC"],
                    50,
                ),
                col(
                    "mac_locality",
                    "MAC Locality",
                    DataType::Text,
                    false,
                    &["MAC LOCALITY", "CARRIER LOCALITY"],
                    60,
                ),
            ],
            unique_keys: strings(&["state_code", "county_code", "carrier_number", "locality_code"]),
            // 文件未提供 mac_locality 时由 carrier_number + locality_code 拼出
            derived_rules: vec![DerivedColumnRule::ConcatColumns {
                target: "mac_locality".to_string(),
                left: "carrier_number".to_string(),
                right: "locality_code".to_string(),
            }],
            multi_part: false,
            variants: vec![],
        },
        DataSourceConfig {
            source_code: "PFS_ANES_CF".to_string(),
            source_name: "PFS - Anesthesia Conversion Factor".to_string(),
            category: "Physician Fee Schedule".to_string(),
            description: "麻醉服务的地区转换系数".to_string(),
            target_table: "pfs_anes_cf".to_string(),
            update_frequency: "ANNUAL".to_string(),
            display_order: 40,
            columns: vec![
                col(
                    "mac_locality",
                    "MAC Locality",
                    DataType::Text,
                    true,
                    &["MAC LOCALITY", "LOCALITY", "CARRIER LOCALITY"],
                    10,
                ),
                col("locality_name", "Locality Name", DataType::Text, false, &["LOCALITY NAME", "NAME"], 20),
                col(
                    "anes_conversion_factor",
                    "Anesthesia CF",
                    DataType::Numeric,
                    true,
                    &["ANESTHESIA CF", "ANES CF", "CONVERSION FACTOR", "CF"],
                    30,
                ),
            ],
            unique_keys: strings(&["mac_locality"]),
            derived_rules: vec![],
            multi_part: false,
            variants: vec![],
        },
        DataSourceConfig {
            source_code: "PFS_OPPS_CAP".to_string(),
            source_name: "PFS - OPPS Imaging Cap".to_string(),
            category: "Physician Fee Schedule".to_string(),
            description: "影像技术部分的支付上限".to_string(),
            target_table: "pfs_opps_cap".to_string(),
            update_frequency: "QUARTERLY".to_string(),
            display_order: 50,
            columns: vec![
                col(
                    "hcpcs_code",
                    "HCPCS Code",
                    DataType::Text,
                    true,
                    &["HCPCS", "HCPC", "HCPCS CODE", "CODE"],
                    10,
                ),
                col(
                    "opps_cap_amount",
                    "OPPS Cap Amount",
                    DataType::Numeric,
                    true,
                    &["OPPS CAP", "CAP AMOUNT", "OPPS CAP AMOUNT", "CAP"],
                    20,
                ),
            ],
            unique_keys: strings(&["hcpcs_code"]),
            derived_rules: vec![],
            multi_part: false,
            variants: vec![],
        },
        // ==========================================
        // HCPCS
        // ==========================================
        DataSourceConfig {
            source_code: "HCPCS".to_string(),
            source_name: "HCPCS Level II Codes".to_string(),
            category: "HCPCS".to_string(),
            description: "HCPCS Level II 代码目录（耗材/DME/药品等）".to_string(),
            target_table: "hcpcs_codes".to_string(),
            update_frequency: "QUARTERLY".to_string(),
            display_order: 60,
            columns: vec![
                col(
                    "hcpcs_code",
                    "HCPCS Code",
                    DataType::Text,
                    true,
                    &["HCPC", "HCPCS", "HCPCS CODE", "CODE"],
                    10,
                ),
                col(
                    "short_description",
                    "Short Description",
                    DataType::Text,
                    false,
                    &["SHORT DESCRIPTION", "SHORT DESC", "SHORTDESCRIPTION"],
                    20,
                ),
                col(
                    "long_description",
                    "Long Description",
                    DataType::Text,
                    false,
                    &["LONG DESCRIPTION", "LONG DESC", "LONGDESCRIPTION", "DESCRIPTION"],
                    30,
                ),
                col("add_date", "Add Date", DataType::Date, false, &["ADD DT", "ADD DATE", "ADDED DATE"], 40),
                col(
                    "effective_date",
                    "Effective Date",
                    DataType::Date,
                    false,
                    &["ACT EFF DT", "EFFECTIVE DATE", "EFF DATE", "ACTION EFFECTIVE DATE"],
                    50,
                ),
                col(
                    "termination_date",
                    "Termination Date",
                    DataType::Date,
                    false,
                    &["TERM DT", "TERMINATION DATE", "TERM DATE", "END DATE"],
                    60,
                ),
                col("betos_code", "BETOS Code", DataType::Text, false, &["BETOS", "BETOS CODE", "TOS"], 70),
                col(
                    "coverage_code",
                    "Coverage Code",
                    DataType::Text,
                    false,
                    &["COV", "COVERAGE", "COV CODE", "COVERAGE CODE"],
                    80,
                ),
            ],
            unique_keys: strings(&["hcpcs_code"]),
            derived_rules: vec![],
            multi_part: false,
            variants: vec![],
        },
        // ==========================================
        // NCCI Edits
        // ==========================================
        DataSourceConfig {
            source_code: "NCCI_PTP".to_string(),
            source_name: "NCCI PTP Edits".to_string(),
            category: "NCCI Edits".to_string(),
            description: "Procedure-to-Procedure 捆绑编辑，医院/执业者两个变体，按代码区间分多文件发布"
                .to_string(),
            target_table: "ncci_ptp".to_string(),
            update_frequency: "QUARTERLY".to_string(),
            display_order: 70,
            columns: vec![
                col(
                    "comprehensive_code",
                    "Comprehensive Code",
                    DataType::Text,
                    true,
                    &["Column 1", "Column1", "CODE 1", "COMPREHENSIVE CODE"],
                    10,
                ),
                col(
                    "component_code",
                    "Component Code",
                    DataType::Text,
                    true,
                    &["Column 2", "Column2", "CODE 2", "COMPONENT CODE"],
                    20,
                ),
                col_with_rule(
                    "modifier_indicator",
                    "Modifier Indicator",
                    DataType::Integer,
                    true,
                    &[
                        "Modifier",
                        "MOD IND",
                        "MODIFIER INDICATOR",
                        "Modifier 0=not allowed",
                        "Modifier 0=not allowed 1=allowed 9=not applicable",
                    ],
                    30,
                    // 单元格常带说明文字，取首位数字，合法值 0/1/9
                    SpecialValueRule::LeadingDigitIndicator { valid: vec![0, 1, 9] },
                ),
                col(
                    "effective_date",
                    "Effective Date",
                    DataType::Date,
                    true,
                    &["Effective Date", "EffectiveDate", "EFF DATE", "EFF_DATE"],
                    40,
                ),
                col_with_rule(
                    "deletion_date",
                    "Deletion Date",
                    DataType::Date,
                    false,
                    &["Deletion Date", "DeletionDate", "DEL DATE", "DEL_DATE", "END DATE"],
                    50,
                    // '*' 表示编辑仍然生效
                    SpecialValueRule::AsteriskMeansNull,
                ),
                col(
                    "rationale",
                    "PTP Edit Rationale",
                    DataType::Text,
                    false,
                    &["PTP Edit Rationale", "Rationale", "PTP RATIONALE", "EDIT RATIONALE"],
                    60,
                ),
                col_with_rule(
                    "prior_1996_flag",
                    "Prior to 1996 Flag",
                    DataType::Boolean,
                    false,
                    &[
                        "*=in existence prior to 1996",
                        "*=IN EXISTENCE",
                        "PRIOR 1996",
                        "PRE-1996",
                    ],
                    70,
                    SpecialValueRule::AsteriskMeansTrue,
                ),
            ],
            unique_keys: strings(&["comprehensive_code", "component_code"]),
            derived_rules: vec![],
            multi_part: true,
            variants: strings(&["hospital", "practitioner"]),
        },
        mue_source(
            "NCCI_MUE_DME",
            "NCCI MUE - DME Supplier",
            "DME 供应商的单日最大服务单位数限制",
            &[
                "DME Supplier Services MUE Values",
                "DME MUE Values",
                "MUE Values",
                "DME Supplier MUE",
            ],
            81,
        ),
        mue_source(
            "NCCI_MUE_PRAC",
            "NCCI MUE - Practitioner",
            "医师/执业者服务的单日最大服务单位数限制",
            &[
                "Practitioner Services MUE Values",
                "Practitioner MUE Values",
                "MUE Values",
                "Practitioner MUE",
            ],
            82,
        ),
        mue_source(
            "NCCI_MUE_OPH",
            "NCCI MUE - Outpatient Hospital",
            "门诊医院服务的单日最大服务单位数限制",
            &[
                "Outpatient Hospital Services MUE Values",
                "Outpatient Hospital MUE Values",
                "Hospital MUE Values",
                "MUE Values",
            ],
            83,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_shape() {
        let configs = builtin_configs();
        assert_eq!(configs.len(), 10);

        // source_code 唯一
        let mut codes: Vec<&str> = configs.iter().map(|c| c.source_code.as_str()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 10);

        // 每个源的唯一键必须是已定义的规范列
        for config in &configs {
            for key in &config.unique_keys {
                assert!(
                    config.column(key).is_some(),
                    "{} 的唯一键 {} 未定义",
                    config.source_code,
                    key
                );
            }
            // 派生目标列同样必须已定义
            for rule in &config.derived_rules {
                assert!(config.column(rule.target()).is_some());
                for input in rule.inputs() {
                    assert!(config.column(input).is_some());
                }
            }
        }
    }

    #[test]
    fn test_ptp_variants_and_parts() {
        let configs = builtin_configs();
        let ptp = configs.iter().find(|c| c.source_code == "NCCI_PTP").unwrap();
        assert!(ptp.multi_part);
        assert!(ptp.is_valid_variant(Some("hospital")));
        assert!(ptp.is_valid_variant(Some("practitioner")));
        assert!(!ptp.is_valid_variant(None));

        let rvu = configs.iter().find(|c| c.source_code == "PFS_RVU").unwrap();
        assert!(!rvu.multi_part);
        assert!(rvu.is_valid_variant(None));
    }
}
