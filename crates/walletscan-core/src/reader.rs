//! 读取阶段（生产者）：目标 → 池化块 + 进度事件
use std::io::{self, Read};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{debug, warn};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::error::{FailureKind, TargetFailure};
use crate::observer::ProgressSink;
use crate::pool::{Block, BlockPool};
use crate::target::ScanTarget;
use crate::types::ProgressInfo;

/// 读取阶段结束时的汇总
#[derive(Debug, Default)]
pub(crate) struct ReaderOutcome {
    pub(crate) targets_scanned: usize,
    pub(crate) failures: Vec<TargetFailure>,
    pub(crate) blocks: u64,
    pub(crate) bytes: u64,
    pub(crate) cancelled: bool,
}

/// 单个目标的结束方式
enum TargetEnd {
    Drained,
    Stopped,
}

pub(crate) struct BlockReader<'a> {
    pool: BlockPool,
    out: Sender<Block>,
    progress: &'a dyn ProgressSink,
    cancel: CancelToken,
    outcome: ReaderOutcome,
}

impl<'a> BlockReader<'a> {
    pub(crate) fn new(pool: BlockPool, out: Sender<Block>, progress: &'a dyn ProgressSink, cancel: CancelToken) -> Self {
        Self { pool, out, progress, cancel, outcome: ReaderOutcome::default() }
    }

    /// 依次处理队列中的目标，直到队列关闭且取空（或被取消）
    ///
    /// 返回时 `out` 随 self 一起被丢弃，下游据此得知不会再有新块。
    pub(crate) fn run(mut self, targets: Receiver<Arc<dyn ScanTarget>>) -> ReaderOutcome {
        while let Some(target) = self.next_target(&targets) {
            let label = target.describe();
            match self.read_target(target, &targets) {
                Ok(TargetEnd::Drained) => {
                    debug!(target_name = %label, "target drained");
                    self.outcome.targets_scanned += 1;
                }
                Ok(TargetEnd::Stopped) => {
                    // 挂起点提前返回：令牌已取消，或下游已退出
                    self.outcome.cancelled = self.cancel.is_cancelled();
                    break;
                }
                Err(failure) => {
                    warn!(error = %failure, "skipping target");
                    self.outcome.failures.push(failure);
                }
            }
        }
        self.outcome
    }

    fn next_target(&mut self, targets: &Receiver<Arc<dyn ScanTarget>>) -> Option<Arc<dyn ScanTarget>> {
        loop {
            if self.cancel.is_cancelled() {
                self.outcome.cancelled = true;
                return None;
            }
            match targets.recv_timeout(CANCEL_POLL) {
                Ok(t) => return Some(t),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn read_target(
        &mut self,
        target: Arc<dyn ScanTarget>,
        queue: &Receiver<Arc<dyn ScanTarget>>,
    ) -> Result<TargetEnd, TargetFailure> {
        let label = target.describe();
        let fail = |kind: FailureKind, source: io::Error| TargetFailure { target: label.clone(), kind, source };

        let total_bytes = target.size().map_err(|e| fail(FailureKind::Size, e))?;
        let mut reader = target.open().map_err(|e| fail(FailureKind::Open, e))?;
        let mut offset = target.start_offset();
        debug!(target_name = %label, total_bytes, start_offset = offset, "reading target");

        loop {
            let Some(mut buf) = self.pool.acquire(&self.cancel) else {
                return Ok(TargetEnd::Stopped);
            };
            let (n, err) = fill_buffer(reader.as_mut(), &mut buf);
            if n == 0 {
                self.pool.release(buf);
                return match err {
                    None => Ok(TargetEnd::Drained),
                    Some(e) => Err(fail(FailureKind::Read, e)),
                };
            }

            let block = Block { offset, buf, len: n, source: Arc::clone(&target) };
            offset += n as u64;
            self.outcome.blocks += 1;
            self.outcome.bytes += n as u64;
            self.progress.on_progress(&ProgressInfo {
                current_target: label.clone(),
                scanned_bytes: offset,
                total_bytes,
                unscanned_targets: queue.len(),
            });
            if !self.forward(block) {
                return Ok(TargetEnd::Stopped);
            }
            // 末尾的短块已转发；错误在此之后再上报
            if let Some(e) = err {
                return Err(fail(FailureKind::Read, e));
            }
        }
    }

    /// 推送到下游；取消或下游已退出时返回 false
    fn forward(&self, mut block: Block) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            match self.out.send_timeout(block, CANCEL_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(b)) => block = b,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }
}

/// 尽可能填满缓冲：返回读到的字节数，以及读取中途遇到的非 EOF 错误（若有）
///
/// 读到 0 字节即视为 EOF；`Interrupted` 会重试。
fn fill_buffer(reader: &mut dyn Read, buf: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}
