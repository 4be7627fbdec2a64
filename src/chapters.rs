//! 章节索引
//!
//! 由目录（TOC）与 spine 顺序派生章节边界，一书一目录只构建一次。
//! 章节归属解析是启发式（见 `chapter_for_location`），对非标准目录
//! 结构可能误判，只保证按既定的降级顺序尽力而为。

use crate::locator::Location;
use crate::models::{Chapter, TocItem};

/// 取路径最后一段文件名（小写）
fn file_name_of(href: &str) -> String {
    let clean = href.split(['#', '?']).next().unwrap_or(href);
    clean
        .rsplit('/')
        .next()
        .unwrap_or(clean)
        .to_ascii_lowercase()
}

/// 去掉 href 的锚点/查询部分
fn normalize_href(href: &str) -> &str {
    href.split(['#', '?']).next().unwrap_or(href)
}

/// 目录项 href 在 spine 里的解析：精确 → 后缀 → 仅文件名，按此顺序取第一个命中
fn resolve_spine_index(href: &str, spine: &[String]) -> Option<usize> {
    let target = normalize_href(href);

    if let Some(i) = spine.iter().position(|s| s == target) {
        return Some(i);
    }
    // 后缀匹配只看 spine 路径以目录 href 结尾，反向会误配短文件名
    if let Some(i) = spine.iter().position(|s| s.ends_with(target)) {
        return Some(i);
    }
    let target_name = file_name_of(target);
    spine.iter().position(|s| file_name_of(s) == target_name)
}

/// 目录树拍平为一层（保持文档顺序）
fn flatten_toc<'a>(items: &'a [TocItem], out: &mut Vec<&'a TocItem>) {
    for item in items {
        out.push(item);
        flatten_toc(&item.children, out);
    }
}

/// 章节索引
#[derive(Debug, Clone)]
pub struct ChapterIndex {
    chapters: Vec<Chapter>,
    /// spine 文档 href（章节归属的第一级解析依据）
    spine: Vec<String>,
}

impl ChapterIndex {
    /// 从（目录，spine 文档列表）构建
    ///
    /// 每章 start = 解析到的 spine 序号 / spine 总数；end = 下一章 start，
    /// 末章为 100。任一目录项未命中 spine 时整体退化为按目录序号均分。
    pub fn build(toc: &[TocItem], spine: &[String]) -> ChapterIndex {
        let mut flat: Vec<&TocItem> = Vec::new();
        flatten_toc(toc, &mut flat);

        let entries: Vec<(String, String, Option<usize>)> = flat
            .iter()
            .filter_map(|item| {
                let href = item.location.clone()?;
                let label = item
                    .title
                    .clone()
                    .unwrap_or_else(|| file_name_of(&href));
                let idx = resolve_spine_index(&href, spine);
                Some((label, href, idx))
            })
            .collect();

        if entries.is_empty() {
            return ChapterIndex {
                chapters: Vec::new(),
                spine: spine.to_vec(),
            };
        }

        let all_resolved = !spine.is_empty() && entries.iter().all(|(_, _, idx)| idx.is_some());

        let mut chapters: Vec<Chapter> = if all_resolved {
            let count = spine.len() as f64;
            entries
                .iter()
                .map(|(label, href, idx)| {
                    let i = idx.unwrap();
                    Chapter {
                        label: label.clone(),
                        href: href.clone(),
                        spine_index: Some(i),
                        start_percentage: i as f64 / count * 100.0,
                        end_percentage: 100.0,
                    }
                })
                .collect()
        } else {
            // 未命中 spine：按目录序号均分，保持原有顺序
            let count = entries.len() as f64;
            entries
                .iter()
                .enumerate()
                .map(|(i, (label, href, idx))| Chapter {
                    label: label.clone(),
                    href: href.clone(),
                    spine_index: *idx,
                    start_percentage: i as f64 / count * 100.0,
                    end_percentage: 100.0,
                })
                .collect()
        };

        // end = 下一章 start，末章封口到 100
        for i in 0..chapters.len() {
            chapters[i].end_percentage = if i + 1 < chapters.len() {
                chapters[i + 1].start_percentage
            } else {
                100.0
            };
        }

        ChapterIndex {
            chapters,
            spine: spine.to_vec(),
        }
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// 位置 → 章节标签，三级降级解析
    ///
    /// 1. 位置所在 spine 文档的文件名与章节 href 匹配（忽略大小写）；
    /// 2. 未命中则取解析过 spine 序号的章节里，序号不超过当前 spine 的最后一个；
    /// 3. 仍未命中且位置在全书前 5% 时归入第一章。
    ///
    /// 全部失败返回 None，调用方按「无章节标签」处理，不是错误。
    pub fn chapter_for_location(
        &self,
        location: &Location,
        percentage: Option<f64>,
    ) -> Option<&Chapter> {
        if self.chapters.is_empty() {
            return None;
        }

        // 1：href 文件名匹配
        if let Some(section_href) = self.spine.get(location.spine_index) {
            let name = file_name_of(section_href);
            if let Some(ch) = self
                .chapters
                .iter()
                .find(|c| file_name_of(&c.href) == name)
            {
                return Some(ch);
            }
        }

        // 2：spine 序号不超过当前者取最大
        let best = self
            .chapters
            .iter()
            .filter(|c| matches!(c.spine_index, Some(i) if i <= location.spine_index))
            .max_by_key(|c| c.spine_index);
        if best.is_some() {
            return best;
        }

        // 3：接近书首兜底归入第一章
        if let Some(pct) = percentage {
            if pct <= 5.0 {
                return self.chapters.first();
            }
        }

        None
    }

    /// 百分比 → 章节：取 [start, end) 包含该百分比的章节，100% 钳制到末章
    pub fn chapter_for_percentage(&self, percentage: f64) -> Option<&Chapter> {
        if self.chapters.is_empty() {
            return None;
        }
        let pct = percentage.clamp(0.0, 100.0);
        if pct >= 100.0 {
            return self.chapters.last();
        }
        self.chapters
            .iter()
            .find(|c| pct >= c.start_percentage && pct < c.end_percentage)
            // 区间前缺口（首章不从 0 开始）归入首章
            .or_else(|| self.chapters.first())
    }
}
