// ==========================================
// CMS 参考表数据摄取系统 - 文件解析器实现
// ==========================================
// 支持: CSV (.csv) / Excel (.xlsx/.xls) / 文本 (.txt, 分隔符自动探测)
// 约定: 不假设表头位置，所有单元格按字符串读出，空值不做 NA 推断
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// 解析结果：原始字符串网格（表头行位置由 HeaderResolver 决定）
#[derive(Debug, Clone)]
pub struct RawTable {
    pub file_name: String,
    pub rows: Vec<Vec<String>>,
}

/// 计算文件内容的 SHA-256（重复上传识别用）
pub fn file_sha256(path: &Path) -> ImportResult<(String, i64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut size: i64 = 0;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        size += read as i64;
        hasher.update(&buffer[..read]);
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ==========================================
// 文件解析接口
// ==========================================
pub trait FileParser: Send + Sync {
    fn parse(&self, file_path: &Path) -> ImportResult<RawTable>;
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse(&self, file_path: &Path) -> ImportResult<RawTable> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_path(file_path)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
        }

        Ok(RawTable {
            file_name: file_name_of(file_path),
            rows,
        })
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse(&self, file_path: &Path) -> ImportResult<RawTable> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let mut workbook = open_workbook_auto(file_path)?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::EmptyFile(file_path.display().to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
            .collect();

        Ok(RawTable {
            file_name: file_name_of(file_path),
            rows,
        })
    }
}

// ==========================================
// 文本 Parser 实现（制表符/竖线/逗号 计数探测）
// ==========================================
pub struct TextParser;

impl FileParser for TextParser {
    fn parse(&self, file_path: &Path) -> ImportResult<RawTable> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        // 前 4KiB 采样计数候选分隔符
        let mut file = File::open(file_path)?;
        let mut sample = vec![0u8; 4096];
        let read = file.read(&mut sample)?;
        let sample = String::from_utf8_lossy(&sample[..read]);

        let tab_count = sample.matches('\t').count();
        let comma_count = sample.matches(',').count();
        let pipe_count = sample.matches('|').count();

        let delimiter = if tab_count >= comma_count && tab_count >= pipe_count {
            b'\t'
        } else if pipe_count >= comma_count {
            b'|'
        } else {
            b','
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_path(file_path)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
        }

        Ok(RawTable {
            file_name: file_name_of(file_path),
            rows,
        })
    }
}

// ==========================================
// 统一入口: 按扩展名分发
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse(&self, file_path: &Path) -> ImportResult<RawTable> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => CsvParser.parse(file_path),
            "xlsx" | "xls" => ExcelParser.parse(file_path),
            "txt" => TextParser.parse(file_path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}
