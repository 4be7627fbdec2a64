//! 标注锚点管理
//!
//! 把每条标注的范围定位符映射到当前挂载的章节文档上，维护
//! 「标注 id → 已铺设覆盖层」的映射。范围落在未挂载章节里属于常态，
//! 静默跳过，等那一章挂载后的下一轮铺设周期重试。

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::locator::RangeLocator;
use crate::models::Annotation;

/// 页面矩形（宿主页坐标或嵌套渲染框坐标）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 嵌套渲染框坐标 → 宿主页坐标
///
/// 纯函数，独立于具体渲染技术，点击弹层定位依赖它。
pub fn translate_rect(inner: Rect, frame_offset: (f64, f64)) -> Rect {
    Rect {
        x: inner.x + frame_offset.0,
        y: inner.y + frame_offset.1,
        width: inner.width,
        height: inner.height,
    }
}

/// 覆盖层几何模型：由字符偏移估算行列位置
///
/// 宿主渲染面重排（字体/主题/窗口变化）后必须换新的度量重新铺设。
#[derive(Debug, Clone, Copy)]
pub struct LayoutMetrics {
    pub chars_per_line: usize,
    pub line_height: f64,
    pub char_width: f64,
    /// 渲染框左上角在宿主页里的偏移
    pub frame_offset: (f64, f64),
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            chars_per_line: 40,
            line_height: 24.0,
            char_width: 16.0,
            frame_offset: (0.0, 0.0),
        }
    }
}

impl LayoutMetrics {
    /// 范围起点的覆盖层矩形（渲染框坐标）
    fn rect_for(&self, range: &RangeLocator) -> Rect {
        let cpl = self.chars_per_line.max(1);
        let line = range.start / cpl;
        let col = range.start % cpl;
        let span = (range.end - range.start).max(1);
        let width = (span.min(cpl - col) as f64) * self.char_width;
        Rect {
            x: col as f64 * self.char_width,
            y: line as f64 * self.line_height,
            width,
            height: self.line_height,
        }
    }
}

/// 已铺设的覆盖层
#[derive(Debug, Clone)]
pub struct AppliedAnchor {
    pub annotation_id: i64,
    pub range: RangeLocator,
    /// 渲染框坐标系下的矩形
    pub rect: Rect,
    pub color: String,
}

/// 一轮铺设周期的结果
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
    /// 本轮没能解析的标注（所在章节未挂载），下一轮重试
    pub skipped: Vec<i64>,
}

/// 锚点管理器
pub struct AnchorManager {
    applied: HashMap<i64, AppliedAnchor>,
    metrics: LayoutMetrics,
}

impl AnchorManager {
    pub fn new(metrics: LayoutMetrics) -> AnchorManager {
        AnchorManager {
            applied: Default::default(),
            metrics,
        }
    }

    pub fn applied(&self) -> &HashMap<i64, AppliedAnchor> {
        &self.applied
    }

    /// 渲染面重排后更新几何度量并清掉旧覆盖层
    ///
    /// 重排让既有矩形全部失效，调用方随后跑一轮 `apply_cycle` 重铺。
    pub fn on_reflow(&mut self, metrics: LayoutMetrics) {
        self.metrics = metrics;
        self.applied.clear();
    }

    /// 铺设周期：对照标注集合做差量
    ///
    /// 移除集合里已不存在的覆盖层；新标注只尝试在「当前挂载章节」
    /// 内解析，范围落在别的章节或越过正文长度就跳过（不报错），
    /// 等触发下一轮的 Rendered 事件再试。
    pub fn apply_cycle(
        &mut self,
        annotations: &[Annotation],
        book_hash: &str,
        mounted_spine: usize,
        section_text_len: usize,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        // 先移除不在集合里的
        let keep: Vec<i64> = annotations.iter().filter_map(|a| a.id).collect();
        let stale: Vec<i64> = self
            .applied
            .keys()
            .filter(|id| !keep.contains(*id))
            .copied()
            .collect();
        for id in stale {
            self.applied.remove(&id);
            outcome.removed.push(id);
        }

        for annotation in annotations {
            let Some(id) = annotation.id else { continue };
            if self.applied.contains_key(&id) {
                continue;
            }
            let Some(range) = RangeLocator::parse(&annotation.range_locator) else {
                debug!("[锚点] 范围定位符非法，跳过: {}", annotation.range_locator);
                outcome.skipped.push(id);
                continue;
            };
            // 只在当前挂载的章节文档内解析
            if range.book_hash != book_hash
                || range.spine_index != mounted_spine
                || range.end > section_text_len
            {
                outcome.skipped.push(id);
                continue;
            }
            let rect = self.metrics.rect_for(&range);
            self.applied.insert(
                id,
                AppliedAnchor {
                    annotation_id: id,
                    range,
                    rect,
                    color: annotation.color.clone(),
                },
            );
            outcome.added.push(id);
        }

        outcome
    }

    /// 点击覆盖层：返回宿主页坐标系下的矩形，供弹层定位
    pub fn click_target(&self, annotation_id: i64) -> Option<Rect> {
        let anchor = self.applied.get(&annotation_id)?;
        Some(translate_rect(anchor.rect, self.metrics.frame_offset))
    }
}
