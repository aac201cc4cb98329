use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use walletscan_core::{
    CancelToken, Detection, FileScanTarget, ProgressInfo, ScanError, ScanOptions, ScanTarget, Scanner, SignatureSet,
    DEFAULT_BLOCK_SIZE, DEFAULT_POOL_SIZE,
};

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "walletscan", version, about = "扫描文件或磁盘镜像中的比特币钱包签名")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描单个文件 / 镜像
    Scan {
        /// 待扫描的文件路径
        #[arg(long)]
        input: PathBuf,

        /// 起始偏移（字节）；之前的内容不读取
        #[arg(long, default_value_t = 0)]
        start_offset: u64,

        /// 块大小（字节）
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,

        /// 缓冲池块数
        #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
        pool_size: usize,

        /// 签名文件路径（TOML）；为空则使用内置钱包签名
        #[arg(long)]
        signatures: Option<PathBuf>,

        /// 开启跨块边界检测
        #[arg(long)]
        overlap: bool,

        /// 检测结果输出文件（JSON 数组）
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { input, start_offset, block_size, pool_size, signatures, overlap, output } => {
            info!(?input, start_offset, "starting scan");

            let signature_set = match &signatures {
                Some(path) => SignatureSet::load(path)?,
                None => SignatureSet::wallet_defaults(),
            };
            let opts = ScanOptions {
                block_size,
                block_pool_size: pool_size,
                boundary_overlap: overlap,
                ..ScanOptions::default()
            };
            let scanner = Scanner::new(opts, signature_set).context("invalid scan options")?;
            info!(
                signatures = scanner.signatures().len(),
                block_size = scanner.options().block_size,
                overlap = scanner.options().boundary_overlap,
                "scanner ready"
            );

            // Ctrl-C 取消扫描：两个阶段在下一个挂起点退出
            let cancel = CancelToken::new();
            {
                let cancel = cancel.clone();
                ctrlc::set_handler(move || cancel.cancel()).context("install Ctrl-C handler")?;
            }

            let found: Mutex<Vec<Detection>> = Mutex::new(Vec::new());
            let on_detection = |d: &Detection| {
                info!("Detection: {}", d.description);
                found.lock().unwrap_or_else(|e| e.into_inner()).push(d.clone());
            };
            let on_progress = |p: &ProgressInfo| {
                info!(
                    target_name = %p.current_target,
                    scanned = p.scanned_bytes,
                    total = p.total_bytes,
                    queued = p.unscanned_targets,
                    "progress"
                );
            };

            let target: Arc<dyn ScanTarget> = Arc::new(FileScanTarget::new(&input, start_offset));
            let result = scanner.scan_with_cancel(vec![target], &on_detection, &on_progress, &cancel);

            if let Some(path) = output {
                let found = found.into_inner().unwrap_or_else(|e| e.into_inner());
                write_detections(&path, &found)?;
            }
            report(result)?;
        }
    }

    Ok(())
}

/// 以 JSON 数组写出检测结果
fn write_detections(path: &Path, detections: &[Detection]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).context("create output file")?);
    serde_json::to_writer_pretty(&mut out, detections).context("write detections")?;
    out.flush().context("flush output file")?;
    info!(?path, count = detections.len(), "detections written");
    Ok(())
}

fn report(result: std::result::Result<walletscan_core::ScanStats, ScanError>) -> Result<()> {
    match result {
        Ok(stats) => {
            info!(
                blocks = stats.blocks_read,
                bytes = stats.bytes_read,
                detections = stats.detections,
                "scan complete"
            );
            Ok(())
        }
        Err(ScanError::TargetsFailed { failures, stats }) => {
            for f in &failures {
                error!(error = %f, "target failed");
            }
            anyhow::bail!("{} target(s) failed after reading {} bytes", failures.len(), stats.bytes_read)
        }
        Err(e @ ScanError::Cancelled { .. }) => {
            warn!("scan interrupted");
            Err(e.into())
        }
        Err(e) => Err(e).context("scan failed"),
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级，如：RUST_LOG=debug
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
