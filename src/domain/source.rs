// ==========================================
// CMS 参考表数据摄取系统 - 数据源配置实体
// ==========================================
// 职责: 描述一个数据源的规范列、表头别名、特殊值规则与派生列规则
// 红线: 纯数据定义，不含任何 I/O；源差异一律用规则数据表达，不写每源分支
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// 语义类型
// ==========================================

/// 规范列的语义类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Text,
    Integer,
    Numeric,
    Date,
    Boolean,
}

impl DataType {
    /// 数据库存储用的类型标识
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DataType::Text => "TEXT",
            DataType::Integer => "INTEGER",
            DataType::Numeric => "NUMERIC",
            DataType::Date => "DATE",
            DataType::Boolean => "BOOLEAN",
        }
    }

    pub fn from_db_str(s: &str) -> DataType {
        match s {
            "INTEGER" => DataType::Integer,
            "NUMERIC" => DataType::Numeric,
            "DATE" => DataType::Date,
            "BOOLEAN" => DataType::Boolean,
            _ => DataType::Text,
        }
    }

    /// 对应的 SQLite 列类型
    ///
    /// 日期按 ISO 文本存储；布尔按 0/1 整数存储
    pub fn sqlite_type(&self) -> &'static str {
        match self {
            DataType::Text | DataType::Date => "TEXT",
            DataType::Integer | DataType::Boolean => "INTEGER",
            DataType::Numeric => "REAL",
        }
    }
}

// ==========================================
// 特殊值规则 / 派生列规则
// ==========================================

/// 单列的特殊值规则（按 源+列 配置，规则是数据而非代码分支）
///
/// 典型场景（CMS 公开文件的约定）:
/// - NCCI PTP 删除日期列: '*' 表示“仍然生效” → NULL
/// - NCCI PTP 1996前标志列: '*' 表示 true
/// - NCCI MUE 数值列: 0 是有效限额，绝不能当缺失处理
/// - NCCI PTP 修饰符指示列: 取自由文本的首位数字（合法值枚举）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SpecialValueRule {
    /// '*' → NULL
    AsteriskMeansNull,
    /// '*' → true，其余非空值 → false
    AsteriskMeansTrue,
    /// 0 保留为 0，不得视为缺失
    ZeroIsMeaningful,
    /// 取值的首位数字作为整数，且必须落在合法值集合内
    LeadingDigitIndicator { valid: Vec<i64> },
}

/// 派生列规则：所有列转换完成后计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DerivedColumnRule {
    /// target 缺失时由 left || right 拼接（如 mac_locality = carrier_number + locality_code）
    ConcatColumns {
        target: String,
        left: String,
        right: String,
    },
    /// 从 from 列的自由文本中提取前导整数 token 写入 target（如 mai_id 取自 mai_description）
    LeadingIntegerToken {
        target: String,
        from: String,
        valid: Vec<i64>,
    },
}

impl DerivedColumnRule {
    pub fn target(&self) -> &str {
        match self {
            DerivedColumnRule::ConcatColumns { target, .. } => target,
            DerivedColumnRule::LeadingIntegerToken { target, .. } => target,
        }
    }

    /// 该派生规则依赖的输入列
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DerivedColumnRule::ConcatColumns { left, right, .. } => vec![left, right],
            DerivedColumnRule::LeadingIntegerToken { from, .. } => vec![from],
        }
    }
}

// ==========================================
// 规范列
// ==========================================

/// 规范列定义
///
/// source_headers 为该列在源文件中可能出现的表头别名（逐一枚举，
/// 匹配时做规范化后精确比较，不做模糊匹配）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalColumn {
    pub internal_name: String,
    pub display_name: String,
    pub data_type: DataType,
    pub is_required: bool,
    pub source_headers: Vec<String>,
    pub special_rule: Option<SpecialValueRule>,
    pub display_order: i32,
}

impl CanonicalColumn {
    /// 代码类列（HCPCS/CPT 等）：清洗时大写并保留前导零
    pub fn is_code_column(&self) -> bool {
        self.internal_name.ends_with("_code")
    }
}

// ==========================================
// 数据源配置
// ==========================================

/// 数据源配置
///
/// 一旦被某个版本引用即视为不可变（仅允许追加表头别名）；
/// 新增数据源是纯数据操作，由配置表注册，不需要新代码路径。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub source_code: String,
    pub source_name: String,
    pub category: String,
    pub description: String,
    /// 该源版本化数据落地的表名
    pub target_table: String,
    pub update_frequency: String,
    pub display_order: i32,
    pub columns: Vec<CanonicalColumn>,
    /// 唯一键列集合（版本+变体范围内唯一）
    pub unique_keys: Vec<String>,
    pub derived_rules: Vec<DerivedColumnRule>,
    /// 是否允许一个版本由多个文件分片组成
    pub multi_part: bool,
    /// 合法变体名集合；为空表示单一隐式变体
    pub variants: Vec<String>,
}

impl DataSourceConfig {
    pub fn column(&self, internal_name: &str) -> Option<&CanonicalColumn> {
        self.columns
            .iter()
            .find(|c| c.internal_name == internal_name)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &CanonicalColumn> {
        self.columns.iter().filter(|c| c.is_required)
    }

    pub fn is_unique_key(&self, internal_name: &str) -> bool {
        self.unique_keys.iter().any(|k| k == internal_name)
    }

    /// 校验变体名是否合法
    ///
    /// - 变体集合为空: 仅接受 None（单一隐式变体）
    /// - 变体集合非空: 必须给出集合内的变体名
    pub fn is_valid_variant(&self, variant: Option<&str>) -> bool {
        match variant {
            None => self.variants.is_empty(),
            Some(v) => self.variants.iter().any(|name| name == v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_db_roundtrip() {
        for dt in [
            DataType::Text,
            DataType::Integer,
            DataType::Numeric,
            DataType::Date,
            DataType::Boolean,
        ] {
            assert_eq!(DataType::from_db_str(dt.to_db_str()), dt);
        }
    }

    #[test]
    fn test_special_rule_json_roundtrip() {
        let rule = SpecialValueRule::LeadingDigitIndicator { valid: vec![0, 1, 9] };
        let json = serde_json::to_string(&rule).unwrap();
        let back: SpecialValueRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_variant_validation() {
        let mut config = DataSourceConfig {
            source_code: "NCCI_PTP".to_string(),
            source_name: "NCCI PTP Edits".to_string(),
            category: "NCCI Edits".to_string(),
            description: String::new(),
            target_table: "ncci_ptp".to_string(),
            update_frequency: "QUARTERLY".to_string(),
            display_order: 0,
            columns: vec![],
            unique_keys: vec![],
            derived_rules: vec![],
            multi_part: true,
            variants: vec!["hospital".to_string(), "practitioner".to_string()],
        };

        assert!(config.is_valid_variant(Some("hospital")));
        assert!(!config.is_valid_variant(Some("dme")));
        assert!(!config.is_valid_variant(None));

        config.variants.clear();
        assert!(config.is_valid_variant(None));
        assert!(!config.is_valid_variant(Some("hospital")));
    }
}
