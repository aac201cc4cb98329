//! 观察者接口：检测结果与进度的接收方
//!
//! 回调在各自阶段的线程上同步执行，实现方不得长时间阻塞，否则会拖住流水线。
use crate::types::{Detection, ProgressInfo};

/// 接收检测结果（在检测线程上调用）
pub trait DetectionSink: Send + Sync {
    fn on_detection(&self, detection: &Detection);
}

/// 接收进度事件（在读取线程上调用）
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &ProgressInfo);
}

impl<F> DetectionSink for F
where
    F: Fn(&Detection) + Send + Sync,
{
    fn on_detection(&self, detection: &Detection) {
        self(detection)
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressInfo) + Send + Sync,
{
    fn on_progress(&self, progress: &ProgressInfo) {
        self(progress)
    }
}

/// 空实现：忽略进度
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _: &ProgressInfo) {}
}

/// 观察者组合：把事件按注册顺序分发给多个接收方（如测试收集器、UI、日志）
#[derive(Default)]
pub struct Observers<'a> {
    detections: Vec<&'a dyn DetectionSink>,
    progress: Vec<&'a dyn ProgressSink>,
}

impl<'a> Observers<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_detection(mut self, sink: &'a dyn DetectionSink) -> Self {
        self.detections.push(sink);
        self
    }

    pub fn on_progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.progress.push(sink);
        self
    }
}

impl DetectionSink for Observers<'_> {
    fn on_detection(&self, detection: &Detection) {
        for s in &self.detections {
            s.on_detection(detection);
        }
    }
}

impl ProgressSink for Observers<'_> {
    fn on_progress(&self, progress: &ProgressInfo) {
        for s in &self.progress {
            s.on_progress(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn fans_out_to_every_sink() {
        let a = Mutex::new(Vec::new());
        let b = Mutex::new(0usize);
        let collect = |d: &Detection| a.lock().unwrap().push(d.signature.clone());
        let count = |_: &Detection| *b.lock().unwrap() += 1;
        let ticks = Mutex::new(Vec::new());
        let progress = |p: &ProgressInfo| ticks.lock().unwrap().push(p.scanned_bytes);

        let observers = Observers::new().on_detection(&collect).on_detection(&count).on_progress(&progress);
        let d = Detection::new("wallet.dat", "mem".into(), 0, 3);
        DetectionSink::on_detection(&observers, &d);
        DetectionSink::on_detection(&observers, &d);
        ProgressSink::on_progress(&observers, &ProgressInfo {
            current_target: "mem".into(),
            scanned_bytes: 7,
            total_bytes: 7,
            unscanned_targets: 0,
        });

        assert_eq!(*a.lock().unwrap(), ["wallet.dat", "wallet.dat"]);
        assert_eq!(*b.lock().unwrap(), 2);
        assert_eq!(*ticks.lock().unwrap(), [7]);
    }

    #[test]
    fn description_names_signature_offset_and_target() {
        let d = Detection::new("wallet.dat", "/tmp/disk.img".into(), 8192, 9000);
        assert_eq!(d.description, "Found 'wallet.dat' in block at offset 8192 of /tmp/disk.img");
    }
}
