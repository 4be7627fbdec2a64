//! 渲染面控制器
//!
//! 独占持有 EPUB 引擎实例与当前挂载的章节文档。负责：取书、校验、
//! 生成位置索引、注入显示偏好、导航原语与事件广播。其他组件只读
//! 引擎状态，不得在导航进行中并发修改显示状态。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task;

use crate::chapters::ChapterIndex;
use crate::engine::{self, BookContent};
use crate::error::ReaderError;
use crate::locator::{
    self, is_location_valid, location_from_percentage, percentage_from_location, Location,
    LocationIndex, SAMPLE_INTERVAL,
};
use crate::models::{Chapter, ReaderPreferences, ReadingMode};

/// ZIP 文件签名（EPUB 必须以此开头）
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// 导航完成后的沉降延迟，等引擎内部重排结束再放行下一次导航
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// 书籍字节获取接口（带凭证的二进制 GET 由宿主实现）
#[allow(async_fn_in_trait)]
pub trait BookFetcher {
    async fn fetch(&self, book_id: i64) -> Result<Vec<u8>, ReaderError>;
}

/// 本地文件获取（宿主离线场景/测试用）
pub struct FileFetcher {
    pub path: String,
}

impl BookFetcher for FileFetcher {
    async fn fetch(&self, _book_id: i64) -> Result<Vec<u8>, ReaderError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| ReaderError::Fetch(format!("{}: {}", self.path, e)))
    }
}

/// 加载状态机
///
/// 布尔标志位组合容易出现不可能状态，这里收敛为单一枚举，
/// 所有迁移都经过 `set_state`。位置索引相关操作要求 `Interactive`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SurfaceState {
    Idle,
    Fetching,
    Validating,
    Ready,
    IndexBuilding,
    Interactive,
    Error { message: String },
}

/// 引擎错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// 位置标识失效导致的「章节不存在」，可自愈
    SectionNotFound,
    /// 其他引擎错误，进入错误状态
    Other,
}

/// 渲染面事件（供进度协调器、章节展示、锚点管理各自订阅）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// 阅读位置变化
    LocationChanged { location: Location },
    /// 某章节文档完成挂载/重渲染
    Rendered { spine_index: usize },
    /// 引擎错误（已分类）
    EngineError { kind: EngineErrorKind, message: String },
}

/// 导航目标
#[derive(Debug, Clone)]
pub enum NavTarget {
    Location(Location),
    Href(String),
    Percentage(f64),
}

/// 注入偏好后的章节渲染结果
#[derive(Debug, Clone)]
pub struct StyledSection {
    pub spine_index: usize,
    pub html: String,
}

/// 把显示偏好转成注入每个章节文档的样式规则
///
/// 每个 spine 文档是独立渲染面，样式必须在每次挂载时重新注入，
/// 不能只在启动时注入一次。
fn presentation_css(prefs: &ReaderPreferences) -> String {
    let (fg, bg) = prefs.theme_enum().colors();
    format!(
        "html{{font-size:{}px;}}body{{font-family:{};line-height:{};color:{};background:{};margin:0 auto;padding:0 1em;}}",
        prefs.font_size,
        prefs.font_family,
        prefs.line_height as f64 / 10.0,
        fg,
        bg,
    )
}

fn inject_css(html: &str, css: &str) -> String {
    let style = format!("<style>{}</style>", css);
    if let Some(pos) = html.find("</head>") {
        let mut out = String::with_capacity(html.len() + style.len());
        out.push_str(&html[..pos]);
        out.push_str(&style);
        out.push_str(&html[pos..]);
        out
    } else {
        format!("{}{}", style, html)
    }
}

/// 渲染面控制器
pub struct RenderSurface {
    book_id: i64,
    state: SurfaceState,
    book_hash: String,
    content: Option<BookContent>,
    index: Option<Arc<LocationIndex>>,
    chapter_index: Option<ChapterIndex>,
    prefs: ReaderPreferences,
    current: Option<Location>,
    /// 注入样式后的章节缓存，偏好变化时整体失效
    styled_cache: MokaCache<usize, Arc<StyledSection>>,
    /// 导航进行中守卫：第二个并发导航请求直接丢弃
    nav_in_flight: Arc<AtomicBool>,
    settle_delay: Duration,
    events: broadcast::Sender<SurfaceEvent>,
}

impl RenderSurface {
    pub fn new(book_id: i64, prefs: ReaderPreferences) -> RenderSurface {
        let (events, _) = broadcast::channel(64);
        RenderSurface {
            book_id,
            state: SurfaceState::Idle,
            book_hash: String::new(),
            content: None,
            index: None,
            chapter_index: None,
            prefs,
            current: None,
            styled_cache: MokaCache::new(128),
            nav_in_flight: Arc::new(AtomicBool::new(false)),
            settle_delay: DEFAULT_SETTLE_DELAY,
            events,
        }
    }

    /// 测试/特殊宿主可调整沉降延迟
    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn book_id(&self) -> i64 {
        self.book_id
    }

    pub fn book_hash(&self) -> &str {
        &self.book_hash
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.current.as_ref()
    }

    pub fn location_index(&self) -> Option<Arc<LocationIndex>> {
        self.index.clone()
    }

    pub fn chapter_index(&self) -> Option<&ChapterIndex> {
        self.chapter_index.as_ref()
    }

    pub fn preferences(&self) -> &ReaderPreferences {
        &self.prefs
    }

    /// 订阅渲染面事件
    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    fn set_state(&mut self, next: SurfaceState) {
        debug!("[渲染面] 状态迁移: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn emit(&self, event: SurfaceEvent) {
        // 没有订阅者不算错误
        let _ = self.events.send(event);
    }

    /// 校验取到的书籍字节：非空 + ZIP 签名
    pub fn validate_archive(bytes: &[u8]) -> Result<(), ReaderError> {
        if bytes.is_empty() {
            return Err(ReaderError::EmptyFile);
        }
        if bytes.len() < 4 || bytes[..4] != ZIP_SIGNATURE {
            return Err(ReaderError::InvalidFormat(
                "缺少 ZIP 签名，不是 EPUB 文件".to_string(),
            ));
        }
        Ok(())
    }

    /// 完整加载流程：取书 → 校验 → 解析 → 建索引 → 恢复位置
    ///
    /// `stored_location` 为持久化的上次阅读位置；失效时静默回到书首，
    /// 不让整次加载失败。任何取书/校验失败进入 Error 状态并返回错误。
    pub async fn load<F: BookFetcher>(
        &mut self,
        fetcher: &F,
        stored_location: Option<String>,
    ) -> Result<(), ReaderError> {
        self.set_state(SurfaceState::Fetching);
        let bytes = match fetcher.fetch(self.book_id).await {
            Ok(b) => b,
            Err(e) => {
                self.set_state(SurfaceState::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        self.set_state(SurfaceState::Validating);
        if let Err(e) = Self::validate_archive(&bytes) {
            self.set_state(SurfaceState::Error {
                message: e.to_string(),
            });
            return Err(e);
        }

        let hash = locator::book_hash(&bytes);
        let content = match task::spawn_blocking(move || engine::open_book(bytes))
            .await
            .map_err(|e| ReaderError::Engine(format!("解析任务失败: {}", e)))?
        {
            Ok(c) => c,
            Err(msg) => {
                let err = ReaderError::Engine(msg);
                self.set_state(SurfaceState::Error {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        self.attach_content(hash, content);
        self.finish_load(stored_location).await
    }

    /// 引擎解析结果挂接到渲染面（Ready 状态）
    pub fn attach_content(&mut self, book_hash: String, content: BookContent) {
        self.book_hash = book_hash;
        self.chapter_index = Some(ChapterIndex::build(&content.toc, &content.spine));
        self.content = Some(content);
        self.index = None;
        self.current = None;
        self.set_state(SurfaceState::Ready);
    }

    /// 建索引 + 校验初始位置 + 挂载首个章节（Interactive 状态）
    pub async fn finish_load(&mut self, stored_location: Option<String>) -> Result<(), ReaderError> {
        let sections = match self.content.as_ref() {
            Some(c) => c.sections.clone(),
            None => return Err(ReaderError::Engine("尚未挂接书籍内容".to_string())),
        };

        // 采样索引生成是 CPU 密集操作，放到阻塞线程池
        self.set_state(SurfaceState::IndexBuilding);
        let hash = self.book_hash.clone();
        let index = task::spawn_blocking(move || {
            LocationIndex::build(&hash, &sections, SAMPLE_INTERVAL)
        })
        .await
        .map_err(|e| ReaderError::Engine(format!("索引生成任务失败: {}", e)))?;
        self.index = Some(Arc::new(index));
        self.set_state(SurfaceState::Interactive);

        // 连续滚动模式预加载全部章节，避免滚动中的布局跳动
        if self.prefs.mode_enum() == ReadingMode::Scrolled {
            self.preload_all_sections().await;
        }

        // 持久化的位置先校验再用，失效一律回书首
        let initial = stored_location
            .as_deref()
            .and_then(|raw| {
                let index = self.index.as_ref()?;
                if is_location_valid(raw, &self.book_hash, index) {
                    Location::parse(raw)
                } else {
                    debug!("[渲染面] 持久化位置失效，回到书首: {}", raw);
                    None
                }
            })
            .unwrap_or_else(|| Location::new(&self.book_hash, 0, 0));

        self.mount(initial).await
    }

    /// 预加载并注入样式到所有章节
    async fn preload_all_sections(&self) {
        let Some(content) = self.content.as_ref() else {
            return;
        };
        let css = presentation_css(&self.prefs);
        for section in &content.sections {
            let styled = Arc::new(StyledSection {
                spine_index: section.index,
                html: inject_css(&section.html, &css),
            });
            self.styled_cache.insert(section.index, styled).await;
        }
    }

    /// 取某章节注入样式后的文档（缓存命中则直接返回）
    pub async fn styled_section(&self, spine_index: usize) -> Result<Arc<StyledSection>, ReaderError> {
        if let Some(hit) = self.styled_cache.get(&spine_index).await {
            return Ok(hit);
        }
        let content = self
            .content
            .as_ref()
            .ok_or_else(|| ReaderError::Engine("尚未挂接书籍内容".to_string()))?;
        let section = content
            .sections
            .get(spine_index)
            .ok_or_else(|| ReaderError::Engine(format!("章节不存在: {}", spine_index)))?;
        let styled = Arc::new(StyledSection {
            spine_index,
            html: inject_css(&section.html, &presentation_css(&self.prefs)),
        });
        self.styled_cache.insert(spine_index, styled.clone()).await;
        Ok(styled)
    }

    /// 挂载目标位置所在的章节并广播事件
    ///
    /// 「章节不存在」类失效位置在此自愈：清掉坏位置，改挂书首。
    async fn mount(&mut self, location: Location) -> Result<(), ReaderError> {
        match self.styled_section(location.spine_index).await {
            Ok(_) => {
                self.current = Some(location.clone());
                self.emit(SurfaceEvent::Rendered {
                    spine_index: location.spine_index,
                });
                self.emit(SurfaceEvent::LocationChanged { location });
                Ok(())
            }
            Err(e) if e.is_section_not_found() => {
                warn!("[渲染面] 位置失效，自愈回书首: {}", e);
                self.emit(SurfaceEvent::EngineError {
                    kind: EngineErrorKind::SectionNotFound,
                    message: e.to_string(),
                });
                let start = Location::new(&self.book_hash, 0, 0);
                match self.styled_section(0).await {
                    Ok(_) => {
                        self.current = Some(start.clone());
                        self.emit(SurfaceEvent::Rendered { spine_index: 0 });
                        self.emit(SurfaceEvent::LocationChanged { location: start });
                        Ok(())
                    }
                    Err(e) => {
                        self.emit(SurfaceEvent::EngineError {
                            kind: EngineErrorKind::Other,
                            message: e.to_string(),
                        });
                        self.set_state(SurfaceState::Error {
                            message: e.to_string(),
                        });
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.emit(SurfaceEvent::EngineError {
                    kind: EngineErrorKind::Other,
                    message: e.to_string(),
                });
                self.set_state(SurfaceState::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// 解析导航目标为具体位置
    fn resolve_target(&self, target: &NavTarget) -> Option<Location> {
        match target {
            NavTarget::Location(loc) => Some(loc.clone()),
            NavTarget::Href(href) => {
                let chapter_index = self.chapter_index.as_ref()?;
                let ch = chapter_index
                    .chapters()
                    .iter()
                    .find(|c| &c.href == href)?;
                let spine = ch.spine_index?;
                Some(Location::new(&self.book_hash, spine, 0))
            }
            NavTarget::Percentage(pct) => {
                location_from_percentage(*pct, self.index.as_deref())
            }
        }
    }

    /// 导航到目标位置
    ///
    /// 并发导航经守卫串行化：已有导航在途时本次请求被丢弃（返回 false），
    /// 沉降延迟结束后才重新放行。丢弃而非排队是有意的简化。
    pub async fn display(&mut self, target: NavTarget) -> Result<bool, ReaderError> {
        if self
            .nav_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[渲染面] 导航在途，丢弃本次请求");
            return Ok(false);
        }

        let result = match self.resolve_target(&target) {
            Some(location) => self.mount(location).await.map(|_| true),
            None => {
                debug!("[渲染面] 导航目标无法解析: {:?}", target);
                Ok(false)
            }
        };

        // 等布局沉降再放行下一次导航，零延迟直接放行
        if self.settle_delay.is_zero() {
            self.nav_in_flight.store(false, Ordering::SeqCst);
        } else {
            let guard = self.nav_in_flight.clone();
            let delay = self.settle_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                guard.store(false, Ordering::SeqCst);
            });
        }

        result
    }

    /// 下一章
    pub async fn next(&mut self) -> Result<bool, ReaderError> {
        let Some(current) = self.current.clone() else {
            return Ok(false);
        };
        let count = self.content.as_ref().map(|c| c.sections.len()).unwrap_or(0);
        if current.spine_index + 1 >= count {
            return Ok(false);
        }
        let target = Location::new(&self.book_hash, current.spine_index + 1, 0);
        self.display(NavTarget::Location(target)).await
    }

    /// 上一章
    pub async fn prev(&mut self) -> Result<bool, ReaderError> {
        let Some(current) = self.current.clone() else {
            return Ok(false);
        };
        if current.spine_index == 0 {
            return Ok(false);
        }
        let target = Location::new(&self.book_hash, current.spine_index - 1, 0);
        self.display(NavTarget::Location(target)).await
    }

    /// 滚动/翻页产生的文档内位置变化（宿主上报字符偏移）
    pub fn relocated_within_section(&mut self, char_offset: usize) {
        let Some(current) = self.current.as_ref() else {
            return;
        };
        let location = Location::new(&self.book_hash, current.spine_index, char_offset);
        self.current = Some(location.clone());
        self.emit(SurfaceEvent::LocationChanged { location });
    }

    /// 应用新的显示偏好
    ///
    /// 偏好注入到的是每个独立章节文档，必须清缓存并对当前章节重渲染；
    /// 导航在途时拒绝，调用方等沉降后重试。
    pub async fn apply_preferences(&mut self, prefs: ReaderPreferences) -> Result<(), ReaderError> {
        if self.nav_in_flight.load(Ordering::SeqCst) {
            return Err(ReaderError::Message(
                "导航进行中，暂不能修改显示偏好".to_string(),
            ));
        }
        self.prefs = prefs;
        self.styled_cache.invalidate_all();

        if self.prefs.mode_enum() == ReadingMode::Scrolled {
            self.preload_all_sections().await;
        }

        // 当前章节按新偏好重渲染，触发锚点重铺
        if let Some(current) = self.current.clone() {
            self.styled_section(current.spine_index).await?;
            self.emit(SurfaceEvent::Rendered {
                spine_index: current.spine_index,
            });
        }
        Ok(())
    }

    /// 当前百分比（索引未就绪返回 None）
    pub fn current_percentage(&self) -> Option<f64> {
        let current = self.current.as_ref()?;
        percentage_from_location(current, self.index.as_deref())
    }

    /// 当前章节解析（事件驱动是主路径，此方法同时作为低频轮询兜底）
    pub fn reconcile_chapter(&self) -> Option<&Chapter> {
        let current = self.current.as_ref()?;
        let chapter_index = self.chapter_index.as_ref()?;
        chapter_index.chapter_for_location(current, self.current_percentage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PreparedSection;
    use crate::models::TocItem;

    fn section(index: usize, path: &str, text: &str) -> PreparedSection {
        PreparedSection {
            index,
            path: path.to_string(),
            html: format!("<html><head></head><body><p>{}</p></body></html>", text),
            text: text.to_string(),
            resource_refs: Vec::new(),
        }
    }

    fn toc_item(title: &str, href: &str) -> TocItem {
        TocItem {
            title: Some(title.to_string()),
            location: Some(href.to_string()),
            level: 0,
            children: Vec::new(),
        }
    }

    fn test_content() -> BookContent {
        BookContent {
            book_info: crate::models::BookInfo {
                title: Some("测试书".to_string()),
                author: None,
                description: None,
                publisher: None,
                language: None,
                section_count: 3,
                cover_image: None,
            },
            toc: vec![
                toc_item("第一章", "ch1.xhtml"),
                toc_item("第二章", "ch2.xhtml"),
                toc_item("第三章", "ch3.xhtml"),
            ],
            spine: vec![
                "ch1.xhtml".to_string(),
                "ch2.xhtml".to_string(),
                "ch3.xhtml".to_string(),
            ],
            sections: vec![
                section(0, "ch1.xhtml", &"甲".repeat(2000)),
                section(1, "ch2.xhtml", &"乙".repeat(2000)),
                section(2, "ch3.xhtml", &"丙".repeat(2000)),
            ],
            resources: Vec::new(),
        }
    }

    async fn interactive_surface(stored: Option<String>) -> RenderSurface {
        let mut surface = RenderSurface::new(1, ReaderPreferences::defaults(1));
        surface.set_settle_delay(Duration::ZERO);
        surface.attach_content("0123456789abcdef".to_string(), test_content());
        surface.finish_load(stored).await.unwrap();
        surface
    }

    #[test]
    fn test_event_json_shape() {
        // 事件以 tagged JSON 发给宿主
        let ev = SurfaceEvent::Rendered { spine_index: 2 };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"event":"rendered","spine_index":2}"#);

        let ev = SurfaceEvent::LocationChanged {
            location: Location::new("0123456789abcdef", 1, 500),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""event":"location_changed""#));
    }

    #[test]
    fn test_validate_archive_distinguishes_errors() {
        assert!(matches!(
            RenderSurface::validate_archive(&[]),
            Err(ReaderError::EmptyFile)
        ));
        assert!(matches!(
            RenderSurface::validate_archive(b"not a zip"),
            Err(ReaderError::InvalidFormat(_))
        ));
        assert!(RenderSurface::validate_archive(b"PK\x03\x04rest").is_ok());
    }

    #[tokio::test]
    async fn test_load_reaches_interactive() {
        let surface = interactive_surface(None).await;
        assert_eq!(*surface.state(), SurfaceState::Interactive);
        assert!(surface.location_index().is_some());
        let loc = surface.current_location().unwrap();
        assert_eq!(loc.spine_index, 0);
        assert_eq!(loc.char_offset, 0);
    }

    #[tokio::test]
    async fn test_invalid_stored_location_starts_from_beginning() {
        // 语法合理但无法解析的位置 → 书首，不报错不崩溃
        let surface =
            interactive_surface(Some("v1:0123456789abcdef:9:123".to_string())).await;
        assert_eq!(*surface.state(), SurfaceState::Interactive);
        assert_eq!(surface.current_location().unwrap().spine_index, 0);
        assert_eq!(surface.current_percentage(), Some(0.0));
    }

    #[tokio::test]
    async fn test_foreign_book_location_starts_from_beginning() {
        // 他书产生的位置（哈希不匹配）按失效处理
        let surface =
            interactive_surface(Some("v1:ffffffffffffffff:1:10".to_string())).await;
        assert_eq!(surface.current_location().unwrap().spine_index, 0);
    }

    #[tokio::test]
    async fn test_valid_stored_location_restored() {
        let surface =
            interactive_surface(Some("v1:0123456789abcdef:1:500".to_string())).await;
        let loc = surface.current_location().unwrap();
        assert_eq!(loc.spine_index, 1);
        assert_eq!(loc.char_offset, 500);
    }

    #[tokio::test]
    async fn test_fetch_error_enters_error_state() {
        struct FailingFetcher;
        impl BookFetcher for FailingFetcher {
            async fn fetch(&self, _book_id: i64) -> Result<Vec<u8>, ReaderError> {
                Err(ReaderError::Fetch("connection refused".to_string()))
            }
        }
        let mut surface = RenderSurface::new(1, ReaderPreferences::defaults(1));
        let result = surface.load(&FailingFetcher, None).await;
        assert!(result.is_err());
        assert!(matches!(surface.state(), SurfaceState::Error { .. }));
    }

    #[tokio::test]
    async fn test_empty_bytes_enters_error_state() {
        struct EmptyFetcher;
        impl BookFetcher for EmptyFetcher {
            async fn fetch(&self, _book_id: i64) -> Result<Vec<u8>, ReaderError> {
                Ok(Vec::new())
            }
        }
        let mut surface = RenderSurface::new(1, ReaderPreferences::defaults(1));
        let result = surface.load(&EmptyFetcher, None).await;
        assert!(matches!(result, Err(ReaderError::EmptyFile)));
        assert!(matches!(surface.state(), SurfaceState::Error { .. }));
    }

    #[tokio::test]
    async fn test_navigation_events() {
        let mut surface = interactive_surface(None).await;
        let mut rx = surface.subscribe();
        assert!(surface.next().await.unwrap());
        // Rendered 先于 LocationChanged
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, SurfaceEvent::Rendered { spine_index: 1 }));
        let second = rx.recv().await.unwrap();
        match second {
            SurfaceEvent::LocationChanged { location } => assert_eq!(location.spine_index, 1),
            other => panic!("意外事件: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prev_at_start_is_noop() {
        let mut surface = interactive_surface(None).await;
        assert!(!surface.prev().await.unwrap());
        assert_eq!(surface.current_location().unwrap().spine_index, 0);
    }

    #[tokio::test]
    async fn test_concurrent_navigation_dropped() {
        let mut surface = interactive_surface(None).await;
        // 手动占住守卫模拟在途导航
        surface.nav_in_flight.store(true, Ordering::SeqCst);
        let accepted = surface.next().await.unwrap();
        assert!(!accepted);
        assert_eq!(surface.current_location().unwrap().spine_index, 0);
        surface.nav_in_flight.store(false, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_display_percentage() {
        let mut surface = interactive_surface(None).await;
        assert!(surface.display(NavTarget::Percentage(55.0)).await.unwrap());
        assert_eq!(surface.current_location().unwrap().spine_index, 1);
    }

    #[tokio::test]
    async fn test_display_href() {
        let mut surface = interactive_surface(None).await;
        assert!(surface
            .display(NavTarget::Href("ch3.xhtml".to_string()))
            .await
            .unwrap());
        assert_eq!(surface.current_location().unwrap().spine_index, 2);
    }

    #[tokio::test]
    async fn test_section_not_found_self_heals() {
        let mut surface = interactive_surface(None).await;
        let mut rx = surface.subscribe();
        let bad = Location::new("0123456789abcdef", 42, 0);
        // 失效位置不报硬错误，自愈回书首
        surface.mount(bad).await.unwrap();
        assert_eq!(*surface.state(), SurfaceState::Interactive);
        assert_eq!(surface.current_location().unwrap().spine_index, 0);
        let ev = rx.recv().await.unwrap();
        assert!(matches!(
            ev,
            SurfaceEvent::EngineError {
                kind: EngineErrorKind::SectionNotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_preferences_reinjected_on_change() {
        let mut surface = interactive_surface(None).await;
        let before = surface.styled_section(0).await.unwrap();
        assert!(before.html.contains("font-size:16px"));

        let mut prefs = ReaderPreferences::defaults(1);
        prefs.font_size = 22;
        prefs.theme = "dark".to_string();
        let mut rx = surface.subscribe();
        surface.apply_preferences(prefs).await.unwrap();

        // 缓存失效后按新偏好重新注入
        let after = surface.styled_section(0).await.unwrap();
        assert!(after.html.contains("font-size:22px"));
        assert!(after.html.contains("#1e1e1e"));
        // 重渲染事件触发锚点重铺
        let ev = rx.recv().await.unwrap();
        assert!(matches!(ev, SurfaceEvent::Rendered { spine_index: 0 }));
    }

    #[tokio::test]
    async fn test_preferences_blocked_during_navigation() {
        let mut surface = interactive_surface(None).await;
        surface.nav_in_flight.store(true, Ordering::SeqCst);
        let result = surface
            .apply_preferences(ReaderPreferences::defaults(1))
            .await;
        assert!(result.is_err());
        surface.nav_in_flight.store(false, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_scrolled_mode_preloads_all_sections() {
        let mut prefs = ReaderPreferences::defaults(1);
        prefs.reading_mode = "scrolled".to_string();
        let mut surface = RenderSurface::new(1, prefs);
        surface.set_settle_delay(Duration::ZERO);
        surface.attach_content("0123456789abcdef".to_string(), test_content());
        surface.finish_load(None).await.unwrap();
        for i in 0..3 {
            assert!(surface.styled_cache.get(&i).await.is_some());
        }
    }

    #[tokio::test]
    async fn test_reconcile_chapter() {
        let mut surface = interactive_surface(None).await;
        assert_eq!(surface.reconcile_chapter().unwrap().label, "第一章");
        surface.next().await.unwrap();
        surface.next().await.unwrap();
        assert_eq!(surface.reconcile_chapter().unwrap().label, "第三章");
    }

    #[tokio::test]
    async fn test_relocated_within_section_emits_event() {
        let mut surface = interactive_surface(None).await;
        let mut rx = surface.subscribe();
        surface.relocated_within_section(1234);
        let ev = rx.recv().await.unwrap();
        match ev {
            SurfaceEvent::LocationChanged { location } => {
                assert_eq!(location.char_offset, 1234);
            }
            other => panic!("意外事件: {:?}", other),
        }
    }
}
