//! 取消令牌：在流水线的每个挂起点轮询
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 挂起点的轮询间隔
pub(crate) const CANCEL_POLL: Duration = Duration::from_millis(50);

/// 可跨线程克隆的取消令牌
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生子令牌：父令牌取消时子令牌随之取消，反之不影响父令牌
    pub fn child(&self) -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), parent: Some(Arc::clone(&self.cancelled)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.load(Ordering::SeqCst))
    }
}
