//! 签名集合：内置钱包签名 + TOML 签名文件加载
use anyhow::{bail, Context, Result};
use aho_corasick::AhoCorasick;
use serde::Deserialize;
use std::path::Path;

/// 单个字节签名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Signature {
    /// 以字面量作为名称的签名
    pub fn literal(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref().to_vec();
        Self { name: String::from_utf8_lossy(&bytes).into_owned(), bytes }
    }

    pub fn named(name: impl Into<String>, bytes: impl AsRef<[u8]>) -> Self {
        Self { name: name.into(), bytes: bytes.as_ref().to_vec() }
    }
}

/// 不可变签名集合（构建后可通过 Arc 在线程间共享）
///
/// 内部使用一个 Aho-Corasick 自动机一次性匹配全部签名。
#[derive(Debug, Clone)]
pub struct SignatureSet {
    signatures: Vec<Signature>,
    ac: AhoCorasick,
    max_len: usize,
}

impl SignatureSet {
    pub fn new(signatures: Vec<Signature>) -> Result<Self> {
        for s in &signatures {
            if s.bytes.is_empty() {
                bail!("signature '{}' is empty", s.name);
            }
        }
        let ac = AhoCorasick::new(signatures.iter().map(|s| s.bytes.as_slice()))
            .context("build signature automaton")?;
        let max_len = signatures.iter().map(|s| s.bytes.len()).max().unwrap_or(0);
        Ok(Self { signatures, ac, max_len })
    }

    /// 内置的比特币钱包签名（Berkeley DB 钱包记录键与钱包文件名）
    pub fn wallet_defaults() -> Self {
        let signatures = vec![Signature::literal("orderposnext"), Signature::literal("wallet.dat")];
        // 固定的非空字面量，构建不会失败
        Self::new(signatures).expect("built-in signatures are valid")
    }

    /// 从 TOML 签名文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read signature file {}", path.display()))?;
        Self::from_toml_str(&txt).with_context(|| format!("parse signature file {}", path.display()))
    }

    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let parsed: SignatureFile = toml::from_str(txt)?;
        let mut out = Vec::with_capacity(parsed.signatures.len());
        for e in parsed.signatures {
            let bytes = match (e.literal, e.hex) {
                (Some(lit), None) => lit.into_bytes(),
                (None, Some(h)) => {
                    let digits = h.strip_prefix("0x").or_else(|| h.strip_prefix("0X")).unwrap_or(&h);
                    hex::decode(digits).with_context(|| format!("signature '{}': bad hex", e.name))?
                }
                (Some(_), Some(_)) => bail!("signature '{}': set either literal or hex, not both", e.name),
                (None, None) => bail!("signature '{}': missing literal or hex", e.name),
            };
            out.push(Signature { name: e.name, bytes });
        }
        Self::new(out)
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// 最长签名的字节数（跨块拼接时保留 max_len - 1 字节）
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// 在 `window` 中查找每个签名的首次出现位置，写入 `firsts[签名下标]`
    ///
    /// 仅统计结束位置大于 `min_end` 的命中（用于跳过完全落在上一块拼接前缀中的命中）。
    pub(crate) fn first_matches(&self, window: &[u8], min_end: usize, firsts: &mut Vec<Option<usize>>) {
        firsts.clear();
        firsts.resize(self.signatures.len(), None);
        let mut remaining = self.signatures.len();
        // 重叠迭代按结束位置递增报告，同一签名第一次出现即为最早位置
        for m in self.ac.find_overlapping_iter(window) {
            if m.end() <= min_end {
                continue;
            }
            let slot = &mut firsts[m.pattern().as_usize()];
            if slot.is_none() {
                *slot = Some(m.start());
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }
    }
}

/// 签名文件中的单条签名（literal 或 hex 二选一）
#[derive(Debug, Clone, Deserialize)]
struct SignatureEntry {
    name: String,
    #[serde(default)]
    literal: Option<String>,
    #[serde(default)]
    hex: Option<String>,
}

/// 顶层签名文件结构
#[derive(Debug, Clone, Deserialize)]
struct SignatureFile {
    #[serde(default)]
    signatures: Vec<SignatureEntry>,
}
