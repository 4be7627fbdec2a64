//! 标注面板：对已取回的标注列表做分组与过滤，纯展示层，不发起请求

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::chapters::ChapterIndex;
use crate::locator::{percentage_from_location, LocationIndex, RangeLocator};
use crate::models::Annotation;

/// 分组方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// 按章节（经章节索引解析范围定位符的起点）
    ByChapter,
    /// 按创建日期升序
    ByDate,
}

/// 面板条目：标注 + 作者显示名（过滤时参与匹配）
#[derive(Debug, Clone)]
pub struct PanelEntry {
    pub annotation: Annotation,
    pub author: String,
}

/// 分组后的一组条目
#[derive(Debug, Clone)]
pub struct PanelGroup {
    /// 组内唯一键（章节 href 或日期字符串）
    pub key: String,
    pub label: String,
    pub expanded: bool,
    pub entries: Vec<PanelEntry>,
}

/// 聚焦结果：滚动目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollTarget {
    pub group_key: String,
    pub annotation_id: i64,
}

const UNGROUPED_KEY: &str = "__ungrouped__";
const UNGROUPED_LABEL: &str = "未归类";

pub struct AnnotationsPanel {
    entries: Vec<PanelEntry>,
    grouping: Grouping,
    filter: String,
    expanded: HashSet<String>,
    chapter_index: Option<ChapterIndex>,
    location_index: Option<Arc<LocationIndex>>,
}

impl AnnotationsPanel {
    pub fn new(entries: Vec<PanelEntry>) -> AnnotationsPanel {
        AnnotationsPanel {
            entries,
            grouping: Grouping::ByChapter,
            filter: String::new(),
            expanded: HashSet::new(),
            chapter_index: None,
            location_index: None,
        }
    }

    /// 注入章节归属所需的索引（缺失时按章分组全部落入「未归类」）
    pub fn attach_indexes(
        &mut self,
        chapter_index: ChapterIndex,
        location_index: Arc<LocationIndex>,
    ) {
        self.chapter_index = Some(chapter_index);
        self.location_index = Some(location_index);
    }

    pub fn set_grouping(&mut self, grouping: Grouping) {
        self.grouping = grouping;
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.trim().to_lowercase();
    }

    pub fn toggle_group(&mut self, key: &str) {
        if !self.expanded.remove(key) {
            self.expanded.insert(key.to_string());
        }
    }

    /// 过滤：引文、评论、作者名任一包含关键词即保留
    fn matches_filter(&self, entry: &PanelEntry) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        if entry
            .annotation
            .selected_text
            .to_lowercase()
            .contains(&self.filter)
        {
            return true;
        }
        if let Some(comment) = &entry.annotation.comment {
            if comment.to_lowercase().contains(&self.filter) {
                return true;
            }
        }
        entry.author.to_lowercase().contains(&self.filter)
    }

    /// 条目所属章节的（组键，标签，章节序）
    fn chapter_key_of(&self, entry: &PanelEntry) -> (String, String, usize) {
        let ungrouped = (
            UNGROUPED_KEY.to_string(),
            UNGROUPED_LABEL.to_string(),
            usize::MAX,
        );
        let chapter_index = match &self.chapter_index {
            Some(ci) => ci,
            None => return ungrouped,
        };
        let range = match RangeLocator::parse(&entry.annotation.range_locator) {
            Some(r) => r,
            None => return ungrouped,
        };
        let start = range.start_location();
        let pct = percentage_from_location(&start, self.location_index.as_deref());
        match chapter_index.chapter_for_location(&start, pct) {
            Some(chapter) => {
                let order = chapter_index
                    .chapters()
                    .iter()
                    .position(|c| c.href == chapter.href)
                    .unwrap_or(usize::MAX);
                (chapter.href.clone(), chapter.label.clone(), order)
            }
            None => ungrouped,
        }
    }

    fn date_key_of(entry: &PanelEntry) -> String {
        match entry.annotation.created_at {
            Some(ts) => match Utc.timestamp_opt(ts, 0).single() {
                Some(dt) => dt.format("%Y-%m-%d").to_string(),
                None => UNGROUPED_KEY.to_string(),
            },
            None => UNGROUPED_KEY.to_string(),
        }
    }

    /// 当前分组视图
    ///
    /// 回复永远不进入顶层视图，即使上游漏过滤了也会在这里被剔除。
    /// 组内按创建时间升序。
    pub fn groups(&self) -> Vec<PanelGroup> {
        let visible: Vec<&PanelEntry> = self
            .entries
            .iter()
            .filter(|e| !e.annotation.is_reply())
            .filter(|e| self.matches_filter(e))
            .collect();

        // (排序键, 组键, 标签) -> 条目
        let mut buckets: Vec<(usize, String, String, Vec<PanelEntry>)> = Vec::new();
        for entry in visible {
            let (key, label, order) = match self.grouping {
                Grouping::ByChapter => self.chapter_key_of(entry),
                Grouping::ByDate => {
                    let key = Self::date_key_of(entry);
                    let label = if key == UNGROUPED_KEY {
                        UNGROUPED_LABEL.to_string()
                    } else {
                        key.clone()
                    };
                    (key, label, 0)
                }
            };
            match buckets.iter_mut().find(|(_, k, _, _)| *k == key) {
                Some((_, _, _, items)) => items.push(entry.clone()),
                None => buckets.push((order, key, label, vec![entry.clone()])),
            }
        }

        for (_, _, _, items) in &mut buckets {
            items.sort_by_key(|e| (e.annotation.created_at.unwrap_or(0), e.annotation.id));
        }

        match self.grouping {
            // 章节组按章节顺序，未归类垫底
            Grouping::ByChapter => buckets.sort_by_key(|(order, _, _, _)| *order),
            // 日期组按日期字符串升序（ISO 格式可直接比较），未归类键排最后
            Grouping::ByDate => buckets.sort_by(|a, b| {
                let rank = |k: &str| if k == UNGROUPED_KEY { 1 } else { 0 };
                (rank(&a.1), &a.1).cmp(&(rank(&b.1), &b.1))
            }),
        }

        buckets
            .into_iter()
            .map(|(_, key, label, entries)| PanelGroup {
                expanded: self.expanded.contains(&key),
                key,
                label,
                entries,
            })
            .collect()
    }

    /// 聚焦某条标注（通知深链进入）：展开所在组并返回滚动目标
    pub fn focus(&mut self, annotation_id: i64) -> Option<ScrollTarget> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.annotation.id == Some(annotation_id) && !e.annotation.is_reply())?
            .clone();
        let key = match self.grouping {
            Grouping::ByChapter => self.chapter_key_of(&entry).0,
            Grouping::ByDate => Self::date_key_of(&entry),
        };
        self.expanded.insert(key.clone());
        Some(ScrollTarget {
            group_key: key,
            annotation_id,
        })
    }
}
