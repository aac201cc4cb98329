//! 公共类型（对外暴露）
use serde::Serialize;

/// 一次签名命中（不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    /// 命中的签名名称
    pub signature: String,
    /// 命中所在目标的标签
    pub target: String,
    /// 所在块在源中的绝对起始偏移
    pub block_offset: u64,
    /// 签名在本块中首次出现的绝对偏移
    pub match_offset: u64,
    /// 可读描述（包含签名、块偏移与目标）
    pub description: String,
}

impl Detection {
    pub(crate) fn new(signature: &str, target: String, block_offset: u64, match_offset: u64) -> Self {
        let description = format!("Found '{signature}' in block at offset {block_offset} of {target}");
        Self { signature: signature.to_string(), target, block_offset, match_offset, description }
    }
}

/// 当前目标的读取进度快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressInfo {
    pub current_target: String,
    /// 已到达的绝对偏移
    pub scanned_bytes: u64,
    pub total_bytes: u64,
    /// 仍在队列中等待扫描的目标数
    pub unscanned_targets: usize,
}
