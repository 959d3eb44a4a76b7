// ==========================================
// CMS 参考表数据摄取系统 - 值转换工具
// ==========================================
// 职责: 字符串单元格 → 类型化值 的纯函数集合
// 约定: CMS 文件中的 "NULL"/"N/A" 等记号一律视为缺失；0 永远是有效数值
// ==========================================

use chrono::NaiveDate;

/// 缺失值记号（规范化大写后比较）
const NULL_MARKERS: [&str; 3] = ["NULL", "N/A", "NAN"];

/// 是否缺失记号（空串 / NULL / N/A / NaN）
pub fn is_null_marker(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || NULL_MARKERS.contains(&trimmed.to_uppercase().as_str())
}

/// 日期解析
///
/// 依次尝试 CMS 文件中出现过的格式:
/// YYYYMMDD (NCCI) / MM/DD/YYYY / YYYY-MM-DD / YYYY/MM/DD / MM-DD-YYYY
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if is_null_marker(trimmed) || trimmed == "*" {
        return None;
    }

    const FORMATS: [&str; 5] = ["%Y%m%d", "%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d", "%m-%d-%Y"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// 数值解析（容忍千分位逗号）
pub fn parse_numeric(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if is_null_marker(trimmed) || trimmed == "*" {
        return None;
    }

    trimmed.replace(',', "").parse::<f64>().ok()
}

/// 整数解析
///
/// 经由数值解析截断（文件中整数列偶见 "2.0" 写法）。
pub fn parse_integer(value: &str) -> Option<i64> {
    parse_numeric(value).map(|n| n as i64)
}

/// 布尔解析
///
/// '1'/'true'/'yes'/'y'/'*' → true；'0'/'false'/'no'/'n'/'' → false
pub fn parse_boolean(value: &str) -> Option<bool> {
    let normalized = value.trim().to_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "*" => Some(true),
        "0" | "false" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// 代码清洗（HCPCS/CPT 等）
///
/// 大写、保留前导零；缺失记号 → None
pub fn clean_code(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if is_null_marker(trimmed) {
        return None;
    }
    Some(trimmed.to_uppercase())
}

/// 文本清洗
pub fn clean_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if is_null_marker(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

/// 自由文本的前导整数 token
///
/// "3 Date of Service Edit: Clinical" → 3；合法值集合外 → None
pub fn leading_integer_token(value: &str, valid: &[i64]) -> Option<i64> {
    let trimmed = value.trim();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let token = digits.parse::<i64>().ok()?;
    if valid.is_empty() || valid.contains(&token) {
        Some(token)
    } else {
        None
    }
}

/// 取值首位数字作为指示符
///
/// 单元格可能带说明文字（如 "0=not allowed"），取首字符数字并校验合法值。
pub fn first_digit_indicator(value: &str, valid: &[i64]) -> Option<i64> {
    let trimmed = value.trim();
    let first = trimmed.chars().next()?;
    let digit = first.to_digit(10)? as i64;
    if valid.is_empty() || valid.contains(&digit) {
        Some(digit)
    } else {
        None
    }
}

/// 空白行判定（空单元格占比 ≥ threshold 视为空白/元信息行）
pub fn is_blank_row(cells: &[String], threshold: f64) -> bool {
    if cells.is_empty() {
        return true;
    }
    let empty_count = cells.iter().filter(|c| is_null_marker(c)).count();
    (empty_count as f64) / (cells.len() as f64) >= threshold
}
