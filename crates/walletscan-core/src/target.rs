//! 扫描目标抽象（文件 / 内存）
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 可扫描的字节源
///
/// - `describe`：用于进度与检测描述的可读标签
/// - `start_offset`：扫描起点；`open` 返回的读取器已定位到该处，所有上报偏移以它为基准
/// - `size`：目标总字节数（读取阶段开始前查询一次）
/// - `open`：顺序读取器
pub trait ScanTarget: Send + Sync {
    fn describe(&self) -> String;
    fn start_offset(&self) -> u64;
    fn size(&self) -> io::Result<u64>;
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// 基于文件系统路径的目标
#[derive(Debug, Clone)]
pub struct FileScanTarget {
    path: PathBuf,
    start_offset: u64,
}

impl FileScanTarget {
    pub fn new(path: impl Into<PathBuf>, start_offset: u64) -> Self {
        Self { path: path.into(), start_offset }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScanTarget for FileScanTarget {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn start_offset(&self) -> u64 {
        self.start_offset
    }

    fn size(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let mut file = File::open(&self.path)?;
        if self.start_offset > 0 {
            file.seek(SeekFrom::Start(self.start_offset))?;
        }
        Ok(Box::new(file))
    }
}

/// 内存中的目标（测试与嵌入式调用方使用）
#[derive(Debug, Clone)]
pub struct MemoryScanTarget {
    label: String,
    data: Arc<[u8]>,
    start_offset: u64,
}

impl MemoryScanTarget {
    pub fn new(label: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self { label: label.into(), data: data.into(), start_offset: 0 }
    }

    pub fn with_start_offset(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }
}

impl ScanTarget for MemoryScanTarget {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn start_offset(&self) -> u64 {
        self.start_offset
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let mut cursor = Cursor::new(Arc::clone(&self.data));
        // 越过末尾的起点合法：随后的读取直接返回 0
        cursor.set_position(self.start_offset);
        Ok(Box::new(cursor))
    }
}
