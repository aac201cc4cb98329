//! 钱包签名扫描核心库
//!
//! 设计要点：
//! - 按固定大小的块流式读取目标，内存占用只与 池大小 × 块大小 有关，与目标大小无关。
//! - 读取与检测为两个并发阶段，仅通过有界通道交接块；缓冲在 池 → 读取 → 检测 → 池 之间循环复用。
//! - 单个目标失败（大小、打开、读取）不中止流水线，扫描结束后以汇总错误返回。
//! - 默认每块独立匹配，跨块边界的签名不会检出；可通过 `ScanOptions::boundary_overlap` 开启拼接。

mod cancel;
mod detector;
mod error;
mod observer;
mod options;
mod pool;
mod reader;
mod scan;
mod signatures;
mod target;
mod types;

pub use cancel::CancelToken;
pub use error::{FailureKind, ScanError, TargetFailure};
pub use observer::{DetectionSink, NoProgress, Observers, ProgressSink};
pub use options::{ScanOptions, ScanStats, DEFAULT_BLOCK_SIZE, DEFAULT_POOL_SIZE};
pub use scan::{scan, Scanner};
pub use signatures::{Signature, SignatureSet};
pub use target::{FileScanTarget, MemoryScanTarget, ScanTarget};
pub use types::{Detection, ProgressInfo};
