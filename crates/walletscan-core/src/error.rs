//! 错误类型：单目标失败与整次扫描的汇总错误
use std::fmt;
use std::io;

use thiserror::Error;

use crate::options::ScanStats;

/// 单目标失败发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 查询目标大小失败
    Size,
    /// 打开目标失败
    Open,
    /// 读取过程中出现非 EOF 错误
    Read,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Size => "size query",
            FailureKind::Open => "open",
            FailureKind::Read => "read",
        };
        f.write_str(s)
    }
}

/// 单个目标的失败记录（不会中止整个流水线）
#[derive(Debug, Error)]
#[error("{kind} failed for {target}: {source}")]
pub struct TargetFailure {
    pub target: String,
    pub kind: FailureKind,
    #[source]
    pub source: io::Error,
}

/// 扫描的汇总错误
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid scan options: {0}")]
    Config(String),

    #[error("{} target(s) failed, first: {}", .failures.len(), first_failure(.failures))]
    TargetsFailed { failures: Vec<TargetFailure>, stats: ScanStats },

    /// 取消前已记录的目标失败也一并保留
    #[error("scan cancelled after {} target failure(s)", .failures.len())]
    Cancelled { failures: Vec<TargetFailure>, stats: ScanStats },

    #[error("{0} stage panicked")]
    StagePanicked(&'static str),
}

impl ScanError {
    /// 取出部分完成时的统计信息（若有）
    pub fn stats(&self) -> Option<&ScanStats> {
        match self {
            ScanError::TargetsFailed { stats, .. } | ScanError::Cancelled { stats, .. } => Some(stats),
            _ => None,
        }
    }
}

fn first_failure(failures: &[TargetFailure]) -> String {
    failures.first().map(ToString::to_string).unwrap_or_default()
}
