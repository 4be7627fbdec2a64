//! 位置标识与位置索引
//!
//! 位置标识是不透明字符串 `v1:<书籍哈希>:<spine 序号>:<字符偏移>`，
//! 范围定位符共用同一语法，偏移部分为 `<起>-<止>`。
//! 标识只对产生它的那本书有效；换书或书籍结构变化后按失效处理，绝不 panic。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::engine::PreparedSection;

/// 位置索引采样间隔（字符数）
pub const SAMPLE_INTERVAL: usize = 1024;

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v1:([0-9a-f]{16}):(\d+):(\d+)(?:-(\d+))?$").expect("位置标识正则非法")
});

/// 解析后的位置（单点）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 书籍内容哈希前缀，绑定书籍身份
    pub book_hash: String,
    pub spine_index: usize,
    pub char_offset: usize,
}

impl Location {
    pub fn new(book_hash: &str, spine_index: usize, char_offset: usize) -> Self {
        Self {
            book_hash: book_hash.to_string(),
            spine_index,
            char_offset,
        }
    }

    /// 序列化为不透明字符串
    pub fn encode(&self) -> String {
        format!("v1:{}:{}:{}", self.book_hash, self.spine_index, self.char_offset)
    }

    /// 解析字符串形式，语法非法返回 None
    pub fn parse(s: &str) -> Option<Location> {
        let caps = LOCATION_RE.captures(s.trim())?;
        if caps.get(4).is_some() {
            // 范围形式不是单点位置
            return None;
        }
        Some(Location {
            book_hash: caps[1].to_string(),
            spine_index: caps[2].parse().ok()?,
            char_offset: caps[3].parse().ok()?,
        })
    }
}

/// 解析后的范围定位符（标注锚定用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeLocator {
    pub book_hash: String,
    pub spine_index: usize,
    pub start: usize,
    pub end: usize,
}

impl RangeLocator {
    pub fn encode(&self) -> String {
        format!(
            "v1:{}:{}:{}-{}",
            self.book_hash, self.spine_index, self.start, self.end
        )
    }

    pub fn parse(s: &str) -> Option<RangeLocator> {
        let caps = LOCATION_RE.captures(s.trim())?;
        let end_cap = caps.get(4)?;
        let start: usize = caps[3].parse().ok()?;
        let end: usize = end_cap.as_str().parse().ok()?;
        if end < start {
            return None;
        }
        Some(RangeLocator {
            book_hash: caps[1].to_string(),
            spine_index: caps[2].parse().ok()?,
            start,
            end,
        })
    }

    /// 范围的起点（进度/章节归属以起点计）
    pub fn start_location(&self) -> Location {
        Location::new(&self.book_hash, self.spine_index, self.start)
    }
}

/// 由书籍字节计算身份哈希（SHA-256 前 16 个十六进制字符）
pub fn book_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// 采样点：某 spine 文档内偏移 → 全书累计偏移
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    spine_index: usize,
    char_offset: usize,
    global_offset: u64,
}

/// 位置索引
///
/// 每本书加载后生成一次（CPU 密集，放 spawn_blocking）。
/// 索引就绪前的百分比换算一律返回 None，调用方按「未知」处理。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationIndex {
    book_hash: String,
    samples: Vec<Sample>,
    /// 各 spine 文档起点的全书累计偏移
    section_starts: Vec<u64>,
    total_chars: u64,
}

impl LocationIndex {
    /// 按固定间隔采样全书正文
    pub fn build(book_hash: &str, sections: &[PreparedSection], interval: usize) -> LocationIndex {
        let interval = interval.max(1);
        let mut samples = Vec::new();
        let mut section_starts = Vec::with_capacity(sections.len());
        let mut global: u64 = 0;

        for section in sections {
            section_starts.push(global);
            let len = section.text.chars().count();
            let mut offset = 0usize;
            loop {
                samples.push(Sample {
                    spine_index: section.index,
                    char_offset: offset,
                    global_offset: global + offset as u64,
                });
                offset += interval;
                if offset >= len {
                    break;
                }
            }
            global += len as u64;
        }

        LocationIndex {
            book_hash: book_hash.to_string(),
            samples,
            section_starts,
            total_chars: global,
        }
    }

    pub fn book_hash(&self) -> &str {
        &self.book_hash
    }

    pub fn total_chars(&self) -> u64 {
        self.total_chars
    }

    pub fn section_count(&self) -> usize {
        self.section_starts.len()
    }

    /// 某 spine 文档的正文长度
    fn section_len(&self, spine_index: usize) -> Option<u64> {
        let start = *self.section_starts.get(spine_index)?;
        let end = self
            .section_starts
            .get(spine_index + 1)
            .copied()
            .unwrap_or(self.total_chars);
        Some(end - start)
    }
}

/// 位置 → 百分比（0-100）
///
/// 索引缺失或位置无法解析（他书哈希、越界）时返回 None，
/// 调用方不得用 None 更新界面。
pub fn percentage_from_location(location: &Location, index: Option<&LocationIndex>) -> Option<f64> {
    let index = index?;
    if location.book_hash != index.book_hash {
        return None;
    }
    let start = *index.section_starts.get(location.spine_index)?;
    let len = index.section_len(location.spine_index)?;
    if location.char_offset as u64 > len {
        return None;
    }
    if index.total_chars == 0 {
        return Some(0.0);
    }
    let global = start + location.char_offset as u64;
    Some(global as f64 / index.total_chars as f64 * 100.0)
}

/// 百分比 → 位置（就近采样点）
///
/// 百分比先钳制到 [0,100] 再查找。
pub fn location_from_percentage(percentage: f64, index: Option<&LocationIndex>) -> Option<Location> {
    let index = index?;
    if index.samples.is_empty() {
        return None;
    }
    let pct = percentage.clamp(0.0, 100.0);
    let target = (pct / 100.0 * index.total_chars as f64) as u64;

    // 最后一个 global_offset <= target 的采样点；
    // 空章节会产生同一累计偏移的多个采样点，取最早的那个
    let mut pos = index
        .samples
        .partition_point(|s| s.global_offset <= target)
        .saturating_sub(1);
    while pos > 0 && index.samples[pos - 1].global_offset == index.samples[pos].global_offset {
        pos -= 1;
    }
    let sample = &index.samples[pos];

    Some(Location::new(
        &index.book_hash,
        sample.spine_index,
        sample.char_offset,
    ))
}

/// 持久化的位置是否仍能解析到当前这本书的内容
///
/// 他书产生的标识（哈希不匹配）一律无效，按失效处理而非报错。
pub fn is_location_valid(raw: &str, current_hash: &str, index: &LocationIndex) -> bool {
    let location = match Location::parse(raw) {
        Some(l) => l,
        None => return false,
    };
    if location.book_hash != current_hash || location.book_hash != index.book_hash {
        return false;
    }
    match index.section_len(location.spine_index) {
        Some(len) => (location.char_offset as u64) <= len,
        None => false,
    }
}
