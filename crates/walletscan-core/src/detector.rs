//! 检测阶段（消费者）：块 → 签名匹配 → 检测结果，缓冲归还池
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::observer::DetectionSink;
use crate::pool::{Block, BlockPool};
use crate::signatures::SignatureSet;
use crate::target::ScanTarget;
use crate::types::Detection;

/// 检测阶段结束时通过完成信号发送的汇总
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DetectorOutcome {
    pub(crate) blocks: u64,
    pub(crate) detections: u64,
    pub(crate) cancelled: bool,
}

/// 上一块的末尾字节（跨块拼接用）
struct Carry {
    source: Arc<dyn ScanTarget>,
    /// 上一块结束处的绝对偏移；下一块必须从这里开始才会拼接
    end: u64,
    bytes: Vec<u8>,
}

pub(crate) struct SignatureDetector<'a> {
    signatures: Arc<SignatureSet>,
    pool: BlockPool,
    sink: &'a dyn DetectionSink,
    cancel: CancelToken,
    boundary_overlap: bool,
    carry: Option<Carry>,
    // 以下为复用的临时缓冲
    window: Vec<u8>,
    firsts: Vec<Option<usize>>,
    outcome: DetectorOutcome,
}

impl<'a> SignatureDetector<'a> {
    pub(crate) fn new(
        signatures: Arc<SignatureSet>,
        pool: BlockPool,
        sink: &'a dyn DetectionSink,
        cancel: CancelToken,
        boundary_overlap: bool,
    ) -> Self {
        Self {
            signatures,
            pool,
            sink,
            cancel,
            boundary_overlap,
            carry: None,
            window: Vec::new(),
            firsts: Vec::new(),
            outcome: DetectorOutcome::default(),
        }
    }

    /// 消费块直到上游关闭并取空（或被取消），随后恰好发送一次完成信号
    pub(crate) fn run(mut self, input: Receiver<Block>, done: Sender<DetectorOutcome>) {
        loop {
            if self.cancel.is_cancelled() {
                self.outcome.cancelled = true;
                break;
            }
            match input.recv_timeout(CANCEL_POLL) {
                Ok(block) => self.process(block),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(blocks = self.outcome.blocks, detections = self.outcome.detections, "detector finished");
        // 完成信号为单槽通道，只发送这一次
        let _ = done.send(self.outcome);
    }

    fn process(&mut self, block: Block) {
        let prefix_len = match &self.carry {
            Some(c) if Arc::ptr_eq(&c.source, &block.source) && c.end == block.offset => c.bytes.len(),
            _ => 0,
        };

        let window: &[u8] = if prefix_len > 0 {
            self.window.clear();
            if let Some(c) = &self.carry {
                self.window.extend_from_slice(&c.bytes);
            }
            self.window.extend_from_slice(block.data());
            &self.window
        } else {
            block.data()
        };

        self.signatures.first_matches(window, prefix_len, &mut self.firsts);
        let base = block.offset - prefix_len as u64;
        let mut label: Option<String> = None;
        for (sig, first) in self.signatures.signatures().iter().zip(&self.firsts) {
            let Some(start) = first else { continue };
            let target = label.get_or_insert_with(|| block.source.describe()).clone();
            let detection = Detection::new(&sig.name, target, block.offset, base + *start as u64);
            self.sink.on_detection(&detection);
            self.outcome.detections += 1;
        }

        if self.boundary_overlap {
            let keep = self.signatures.max_len().saturating_sub(1).min(window.len());
            let tail = &window[window.len() - keep..];
            match &mut self.carry {
                Some(c) => {
                    c.bytes.clear();
                    c.bytes.extend_from_slice(tail);
                    c.source = Arc::clone(&block.source);
                    c.end = block.offset + block.len as u64;
                }
                None => {
                    self.carry = Some(Carry {
                        source: Arc::clone(&block.source),
                        end: block.offset + block.len as u64,
                        bytes: tail.to_vec(),
                    });
                }
            }
        }

        self.outcome.blocks += 1;
        self.pool.release(block.buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::Signature;
    use crate::target::MemoryScanTarget;
    use crossbeam_channel::{bounded, unbounded};
    use std::sync::Mutex;

    /// 把给定数据按 block_size 切块后喂给检测阶段，返回检测结果
    fn detect(data: &[u8], block_size: usize, signatures: SignatureSet, overlap: bool) -> Vec<Detection> {
        let source: Arc<dyn ScanTarget> = Arc::new(MemoryScanTarget::new("mem", data.to_vec()));
        let chunks: Vec<&[u8]> = data.chunks(block_size).collect();
        let pool = BlockPool::new(chunks.len().max(1), block_size);
        let (block_tx, block_rx) = unbounded();
        let mut offset = 0u64;
        for chunk in chunks {
            let mut buf = pool.try_acquire().unwrap();
            buf[..chunk.len()].copy_from_slice(chunk);
            block_tx.send(Block { offset, buf, len: chunk.len(), source: Arc::clone(&source) }).unwrap();
            offset += chunk.len() as u64;
        }
        drop(block_tx);

        let found = Mutex::new(Vec::new());
        let sink = |d: &Detection| found.lock().unwrap().push(d.clone());
        let (done_tx, done_rx) = bounded(1);
        SignatureDetector::new(Arc::new(signatures), pool.clone(), &sink, CancelToken::new(), overlap)
            .run(block_rx, done_tx);

        let outcome = done_rx.recv().unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(pool.in_flight(), 0);
        found.into_inner().unwrap()
    }

    fn key_set() -> SignatureSet {
        SignatureSet::new(vec![Signature::literal("KEY!")]).unwrap()
    }

    #[test]
    fn one_detection_per_signature_per_block() {
        let data = b"KEY!....KEY!....";
        let found = detect(data, 16, key_set(), false);
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].block_offset, found[0].match_offset), (0, 0));

        let found = detect(data, 8, key_set(), false);
        let offsets: Vec<_> = found.iter().map(|d| (d.block_offset, d.match_offset)).collect();
        assert_eq!(offsets, [(0, 0), (8, 8)]);
    }

    #[test]
    fn signature_across_boundary_is_missed_by_default() {
        // "KEY!" 跨越 8 字节边界：6..10
        let data = b"......KEY!......";
        assert!(detect(data, 8, key_set(), false).is_empty());
    }

    #[test]
    fn boundary_overlap_catches_split_signature_once() {
        let data = b"......KEY!......";
        let found = detect(data, 8, key_set(), true);
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].block_offset, found[0].match_offset), (8, 6));
    }

    #[test]
    fn boundary_overlap_does_not_repeat_earlier_matches() {
        // 第一块末尾的命中不会在下一块的拼接前缀中再次上报
        let data = b"....KEY!........";
        let found = detect(data, 8, key_set(), true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].block_offset, 0);
    }

    #[test]
    fn reports_each_signature_in_a_block() {
        let found = detect(b"xx wallet.dat yy orderposnext", 4096, SignatureSet::wallet_defaults(), false);
        let names: Vec<_> = found.iter().map(|d| d.signature.as_str()).collect();
        assert_eq!(names, ["orderposnext", "wallet.dat"]);
        assert!(found.iter().all(|d| d.target == "mem"));
    }

    #[test]
    fn cancelled_detector_still_signals_completion() {
        let pool = BlockPool::new(1, 8);
        let (_block_tx, block_rx) = unbounded::<Block>();
        let (done_tx, done_rx) = bounded(1);
        let cancel = CancelToken::new();
        cancel.cancel();
        let sink = |_: &Detection| {};
        SignatureDetector::new(Arc::new(key_set()), pool, &sink, cancel, false).run(block_rx, done_tx);
        assert!(done_rx.recv().unwrap().cancelled);
    }
}
