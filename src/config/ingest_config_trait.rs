// ==========================================
// CMS 参考表数据摄取系统 - 摄取配置读取接口
// ==========================================
// 职责: 定义摄取流程所需配置项的读取接口，屏蔽存储细节
// ==========================================

use async_trait::async_trait;
use std::error::Error;

/// 摄取配置读取接口
///
/// 实现方从 config_kv 表（或测试桩）提供配置值；
/// 摄取引擎只依赖本接口，不直接读库。
#[async_trait]
pub trait IngestConfigReader: Send + Sync {
    /// 等待剩余分片的最长时间（秒），超时后版本转 FAILED
    async fn get_max_part_wait_secs(&self) -> Result<i64, Box<dyn Error>>;

    /// 表头行探测的扫描窗口（文件前 N 行）
    async fn get_header_scan_rows(&self) -> Result<usize, Box<dyn Error>>;

    /// 行数对比告警比例：新版本行数低于上一完成版本的该比例时告警
    async fn get_row_count_warn_ratio(&self) -> Result<f64, Box<dyn Error>>;
}
