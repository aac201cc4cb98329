//! 块缓冲池与流水线传输单元
//!
//! 池在扫描开始前一次性分配全部缓冲，之后缓冲只在 池 → 读取阶段 → 检测阶段 → 池 之间流转：
//! - 任一时刻每个缓冲只属于其中一方，所有权随通道传递，无需加锁；
//! - 池为空时 `acquire` 阻塞，从而对读取阶段形成背压；
//! - `release` 不清空内容，下次读取会覆盖有效区间。
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::cancel::{CancelToken, CANCEL_POLL};
use crate::target::ScanTarget;

/// 流水线中传输的块
pub(crate) struct Block {
    /// `data()[0]` 在源中的绝对偏移
    pub(crate) offset: u64,
    /// 池化缓冲（长度恒为 block_size）
    pub(crate) buf: Vec<u8>,
    /// 有效字节数
    pub(crate) len: usize,
    pub(crate) source: Arc<dyn ScanTarget>,
}

impl Block {
    pub(crate) fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

struct PoolInner {
    free_tx: Sender<Vec<u8>>,
    free_rx: Receiver<Vec<u8>>,
    block_size: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// 固定数量、固定容量的可复用缓冲池（克隆共享同一个池）
#[derive(Clone)]
pub(crate) struct BlockPool {
    inner: Arc<PoolInner>,
}

impl BlockPool {
    /// 预分配 `capacity` 个 `block_size` 字节的缓冲
    pub(crate) fn new(capacity: usize, block_size: usize) -> Self {
        let (free_tx, free_rx) = bounded(capacity);
        for _ in 0..capacity {
            // 容量恰好等于缓冲数，不会阻塞
            let _ = free_tx.send(vec![0u8; block_size]);
        }
        Self {
            inner: Arc::new(PoolInner {
                free_tx,
                free_rx,
                block_size,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// 取出一个空闲缓冲；池空时阻塞，直到有缓冲归还或令牌被取消（返回 None）
    pub(crate) fn acquire(&self, cancel: &CancelToken) -> Option<Vec<u8>> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.inner.free_rx.recv_timeout(CANCEL_POLL) {
                Ok(buf) => {
                    self.track_acquire();
                    return Some(buf);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// 非阻塞获取；池空时返回 None（不会额外分配）
    #[cfg(test)]
    pub(crate) fn try_acquire(&self) -> Option<Vec<u8>> {
        let buf = self.inner.free_rx.try_recv().ok()?;
        self.track_acquire();
        Some(buf)
    }

    /// 归还缓冲
    pub(crate) fn release(&self, buf: Vec<u8>) {
        debug_assert_eq!(buf.len(), self.inner.block_size, "foreign buffer returned to pool");
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        // 池内缓冲总数不超过容量，try_send 不会因队列满而失败
        let _ = self.inner.free_tx.try_send(buf);
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// 扫描期间同时在途的最大缓冲数
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    fn track_acquire(&self) {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pool_is_prefilled_and_bounded() {
        let pool = BlockPool::new(3, 16);
        let bufs: Vec<_> = (0..3).map(|_| pool.try_acquire().unwrap()).collect();
        assert!(bufs.iter().all(|b| b.len() == 16));
        assert_eq!(pool.in_flight(), 3);
        // 池已空：不会分配新缓冲
        assert!(pool.try_acquire().is_none());

        for b in bufs {
            pool.release(b);
        }
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.peak_in_flight(), 3);
    }

    #[test]
    fn release_keeps_buffer_contents() {
        let pool = BlockPool::new(1, 4);
        let mut buf = pool.try_acquire().unwrap();
        buf.copy_from_slice(b"abcd");
        pool.release(buf);
        assert_eq!(pool.try_acquire().unwrap(), b"abcd");
    }

    #[test]
    fn acquire_blocks_until_release() {
        let pool = BlockPool::new(1, 8);
        let cancel = CancelToken::new();
        let held = pool.acquire(&cancel).unwrap();

        let releaser = {
            let pool = pool.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                pool.release(held);
            })
        };
        let buf = pool.acquire(&cancel).expect("buffer released by other thread");
        releaser.join().unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(pool.peak_in_flight(), 1);
    }

    #[test]
    fn acquire_gives_up_when_cancelled() {
        let pool = BlockPool::new(1, 8);
        let cancel = CancelToken::new();
        let _held = pool.acquire(&cancel).unwrap();

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            })
        };
        assert!(pool.acquire(&cancel).is_none());
        canceller.join().unwrap();
    }
}
