// ==========================================
// CMS 参考表数据摄取系统 - 类型化行实体
// ==========================================
// 职责: 规范列名 → 类型化值 的映射，携带来源追溯信息
// ==========================================

use chrono::NaiveDate;
use rusqlite::types::{Null, ToSqlOutput};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// 单元格值
// ==========================================

/// 类型化的单元格值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Numeric(f64),
    Date(NaiveDate),
    Boolean(bool),
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// 展示用字符串（报告抽样等场景）
    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(n) => n.to_string(),
            CellValue::Numeric(f) => f.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Null => String::new(),
        }
    }

    /// 唯一键指纹分量
    ///
    /// NULL 参与键元组比较：两行 (99213, NULL) 视为重复。
    /// 各类型带前缀编码，避免 "1"(文本) 与 1(整数) 误撞。
    fn fingerprint_component(&self) -> String {
        match self {
            CellValue::Text(s) => format!("t:{}", s),
            CellValue::Integer(n) => format!("i:{}", n),
            CellValue::Numeric(f) => format!("n:{}", f.to_bits()),
            CellValue::Date(d) => format!("d:{}", d.format("%Y-%m-%d")),
            CellValue::Boolean(b) => format!("b:{}", *b as u8),
            CellValue::Null => "\u{1}null".to_string(),
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            CellValue::Text(s) => s.to_sql(),
            CellValue::Integer(n) => n.to_sql(),
            CellValue::Numeric(f) => f.to_sql(),
            CellValue::Date(d) => Ok(ToSqlOutput::from(d.format("%Y-%m-%d").to_string())),
            CellValue::Boolean(b) => Ok(ToSqlOutput::from(*b as i64)),
            CellValue::Null => Null.to_sql(),
        }
    }
}

/// 由唯一键值序列生成行指纹（版本+变体范围内查重用）
pub fn key_fingerprint(values: &[CellValue]) -> String {
    values
        .iter()
        .map(|v| v.fingerprint_component())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

// ==========================================
// 行引用 / 类型化行
// ==========================================

/// 行的来源追溯信息（源文件 + 1 起始行号）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub file_name: String,
    pub line_number: usize,
}

impl std::fmt::Display for RowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_name, self.line_number)
    }
}

/// 转换完成的类型化行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRow {
    pub values: HashMap<String, CellValue>,
    pub row_ref: RowRef,
}

impl DataRow {
    pub fn new(row_ref: RowRef) -> Self {
        Self {
            values: HashMap::new(),
            row_ref,
        }
    }

    /// 取列值；未出现的列等价于 NULL
    pub fn get(&self, internal_name: &str) -> &CellValue {
        self.values.get(internal_name).unwrap_or(&CellValue::Null)
    }

    pub fn set(&mut self, internal_name: &str, value: CellValue) {
        self.values.insert(internal_name.to_string(), value);
    }

    /// 按唯一键列集合计算行指纹
    pub fn key_fingerprint(&self, unique_keys: &[String]) -> String {
        let components: Vec<CellValue> = unique_keys
            .iter()
            .map(|k| self.get(k).clone())
            .collect();
        key_fingerprint(&components)
    }
}
