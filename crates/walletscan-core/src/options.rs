//! 扫描选项与统计信息（模块）
use crate::error::ScanError;

/// 默认块大小（字节）
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024; // 4 KiB
/// 默认缓冲池容量（块数）
pub const DEFAULT_POOL_SIZE: usize = 20;
/// 默认目标队列容量
pub const DEFAULT_TARGET_QUEUE_CAPACITY: usize = 1024;
/// 默认已填充块队列容量
pub const DEFAULT_BLOCK_QUEUE_CAPACITY: usize = 30;

/// 扫描选项
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 单个块的固定容量（字节）
    pub block_size: usize,
    /// 缓冲池中预分配的块数；同时也是在途块数的上限
    pub block_pool_size: usize,
    /// 目标队列容量（待扫描目标）
    pub target_queue_capacity: usize,
    /// 读取阶段 → 检测阶段 的块队列容量
    pub block_queue_capacity: usize,
    /// 跨块边界检测：为 true 时将上一块末尾（最长签名长度 - 1）字节拼接到下一块之前再匹配；
    /// 默认 false，每块独立匹配，跨边界的签名不会被检出
    pub boundary_overlap: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_pool_size: DEFAULT_POOL_SIZE,
            target_queue_capacity: DEFAULT_TARGET_QUEUE_CAPACITY,
            block_queue_capacity: DEFAULT_BLOCK_QUEUE_CAPACITY,
            boundary_overlap: false,
        }
    }
}

impl ScanOptions {
    /// 校验选项：任何容量为 0 都会导致流水线无法推进
    pub fn validate(&self) -> Result<(), ScanError> {
        let checks = [
            ("block_size", self.block_size),
            ("block_pool_size", self.block_pool_size),
            ("target_queue_capacity", self.target_queue_capacity),
            ("block_queue_capacity", self.block_queue_capacity),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ScanError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// 扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// 成功读完的目标数
    pub targets_scanned: usize,
    /// 失败（跳过或中途中止）的目标数
    pub targets_failed: usize,
    /// 转发给检测阶段的块数
    pub blocks_read: u64,
    /// 实际读取的字节数
    pub bytes_read: u64,
    /// 产生的检测结果数
    pub detections: u64,
    /// 同时在途（已取出未归还）的最大块数，不超过 block_pool_size
    pub peak_blocks_in_flight: usize,
}
