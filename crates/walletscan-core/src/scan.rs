//! 扫描主流程：两阶段并发流水线的编排
//!
//! 目标队列 → 读取线程（池化块 + 进度）→ 块队列 → 检测线程（签名匹配，缓冲归还池）→ 完成信号
//!
//! 两个阶段只通过空闲缓冲池与块队列两个有界通道耦合；调用线程阻塞在单槽完成信号上。
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, SendTimeoutError};
use tracing::{info, warn};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::detector::SignatureDetector;
use crate::error::ScanError;
use crate::observer::{DetectionSink, ProgressSink};
use crate::options::{ScanOptions, ScanStats};
use crate::pool::BlockPool;
use crate::reader::BlockReader;
use crate::signatures::SignatureSet;
use crate::target::{FileScanTarget, ScanTarget};
use crate::types::{Detection, ProgressInfo};

/// 扫描单个文件（内置钱包签名 + 默认选项）
///
/// `start_offset` 之前的字节不会被读取；所有上报偏移均为文件内的绝对偏移。
pub fn scan(
    start_offset: u64,
    path: impl Into<PathBuf>,
    on_detection: impl Fn(&Detection) + Send + Sync,
    on_progress: impl Fn(&ProgressInfo) + Send + Sync,
) -> Result<ScanStats, ScanError> {
    let target = Arc::new(FileScanTarget::new(path, start_offset));
    Scanner::new(ScanOptions::default(), SignatureSet::wallet_defaults())?.scan(target, &on_detection, &on_progress)
}

/// 可复用的扫描器：选项与签名集合在多次扫描间共享
#[derive(Debug, Clone)]
pub struct Scanner {
    options: ScanOptions,
    signatures: Arc<SignatureSet>,
}

impl Scanner {
    pub fn new(options: ScanOptions, signatures: SignatureSet) -> Result<Self, ScanError> {
        options.validate()?;
        Ok(Self { options, signatures: Arc::new(signatures) })
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    /// 扫描单个目标，阻塞直到流水线排空
    pub fn scan(
        &self,
        target: Arc<dyn ScanTarget>,
        detections: &dyn DetectionSink,
        progress: &dyn ProgressSink,
    ) -> Result<ScanStats, ScanError> {
        self.scan_with_cancel(vec![target], detections, progress, &CancelToken::new())
    }

    /// 按提交顺序依次扫描多个目标
    pub fn scan_targets(
        &self,
        targets: Vec<Arc<dyn ScanTarget>>,
        detections: &dyn DetectionSink,
        progress: &dyn ProgressSink,
    ) -> Result<ScanStats, ScanError> {
        self.scan_with_cancel(targets, detections, progress, &CancelToken::new())
    }

    /// 可取消的扫描；取消后两个阶段在下一个挂起点退出，返回 `ScanError::Cancelled`
    pub fn scan_with_cancel(
        &self,
        targets: Vec<Arc<dyn ScanTarget>>,
        detections: &dyn DetectionSink,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ScanStats, ScanError> {
        let opts = &self.options;
        // 内部令牌：某个阶段异常退出时用于叫停另一个阶段，不影响调用方的令牌
        let stop = cancel.child();
        let pool = BlockPool::new(opts.block_pool_size, opts.block_size);
        let (target_tx, target_rx) = bounded::<Arc<dyn ScanTarget>>(opts.target_queue_capacity);
        let (block_tx, block_rx) = bounded(opts.block_queue_capacity);
        let (done_tx, done_rx) = bounded(1);

        let (reader_res, detector_res) = thread::scope(|s| {
            // 先启动两个阶段再提交目标，避免提交阻塞在无人消费的队列上
            let reader = BlockReader::new(pool.clone(), block_tx, progress, stop.clone());
            let reader_handle = s.spawn(move || reader.run(target_rx));
            let detector = SignatureDetector::new(
                Arc::clone(&self.signatures),
                pool.clone(),
                detections,
                stop.clone(),
                opts.boundary_overlap,
            );
            let detector_handle = s.spawn(move || detector.run(block_rx, done_tx));

            'submit: for mut target in targets {
                loop {
                    if stop.is_cancelled() {
                        break 'submit;
                    }
                    match target_tx.send_timeout(target, CANCEL_POLL) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Timeout(t)) => target = t,
                        Err(SendTimeoutError::Disconnected(_)) => break 'submit,
                    }
                }
            }
            // 关闭目标队列：读取阶段处理完已提交的目标后退出
            drop(target_tx);

            let detector_res = done_rx.recv();
            if detector_res.is_err() {
                // 检测线程未发送完成信号即退出（回调 panic），叫停读取阶段
                stop.cancel();
            }
            let reader_res = reader_handle.join();
            if reader_res.is_err() {
                stop.cancel();
            }
            let _ = detector_handle.join();
            (reader_res, detector_res)
        });

        let reader = reader_res.map_err(|_| ScanError::StagePanicked("reader"))?;
        let detector = detector_res.map_err(|_| ScanError::StagePanicked("detector"))?;

        let stats = ScanStats {
            targets_scanned: reader.targets_scanned,
            targets_failed: reader.failures.len(),
            blocks_read: reader.blocks,
            bytes_read: reader.bytes,
            detections: detector.detections,
            peak_blocks_in_flight: pool.peak_in_flight(),
        };

        if reader.cancelled || detector.cancelled {
            warn!(?stats, failed = reader.failures.len(), "scan cancelled");
            return Err(ScanError::Cancelled { failures: reader.failures, stats });
        }
        info!(
            targets = stats.targets_scanned,
            failed = stats.targets_failed,
            bytes = stats.bytes_read,
            detections = stats.detections,
            "scan finished"
        );
        if !reader.failures.is_empty() {
            return Err(ScanError::TargetsFailed { failures: reader.failures, stats });
        }
        Ok(stats)
    }
}
