//! 进度协调
//!
//! 订阅渲染面的位置变化：内存态与进度条立即更新（同步、廉价），
//! 持久化则是尽力而为，四个触发源收敛到同一个幂等保存例程：
//! 周期定时器、页面隐藏、导航离开/卸载、需要重排的显示模式切换。
//! 保存失败不打断阅读，只翻转「未保存」指示。

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::locator::{percentage_from_location, Location, LocationIndex};
use crate::store::ReadingStore;
use crate::surface::SurfaceEvent;

/// 周期保存间隔
pub const SAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct ProgressState {
    current: Option<Location>,
    percentage: Option<f64>,
    index: Option<Arc<LocationIndex>>,
    /// 上次落库以来是否有未保存的变化
    dirty: bool,
    /// 最近一次保存是否成功（界面指示用）
    saved: bool,
}

/// 进度协调器
///
/// 保存例程幂等：没有位置或索引未就绪时是空操作；并发触发
/// （定时器与页面隐藏几乎同时）按 last-write-wins 容忍，
/// 所有写入都来自同一份内存位置。
pub struct ProgressCoordinator<S: ReadingStore + Send + Sync + 'static> {
    store: Arc<S>,
    user_id: i64,
    book_id: i64,
    state: Arc<Mutex<ProgressState>>,
}

impl<S: ReadingStore + Send + Sync + 'static> Clone for ProgressCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            user_id: self.user_id,
            book_id: self.book_id,
            state: self.state.clone(),
        }
    }
}

impl<S: ReadingStore + Send + Sync + 'static> ProgressCoordinator<S> {
    pub fn new(store: Arc<S>, user_id: i64, book_id: i64) -> ProgressCoordinator<S> {
        ProgressCoordinator {
            store,
            user_id,
            book_id,
            state: Arc::new(Mutex::new(ProgressState {
                current: None,
                percentage: None,
                index: None,
                dirty: false,
                saved: true,
            })),
        }
    }

    /// 位置索引就绪后注入（Interactive 之前的百分比换算一律未知）
    pub async fn set_index(&self, index: Arc<LocationIndex>) {
        let mut state = self.state.lock().await;
        state.index = Some(index);
        // 已有位置的话立刻补算百分比
        if let Some(loc) = state.current.clone() {
            state.percentage = percentage_from_location(&loc, state.index.as_deref());
        }
    }

    /// 渲染面事件入口
    pub async fn on_event(&self, event: &SurfaceEvent) {
        if let SurfaceEvent::LocationChanged { location } = event {
            self.relocated(location.clone()).await;
        }
    }

    /// 位置变化：内存态同步更新，标记未保存
    pub async fn relocated(&self, location: Location) {
        let mut state = self.state.lock().await;
        state.percentage = percentage_from_location(&location, state.index.as_deref());
        state.current = Some(location);
        state.dirty = true;
    }

    /// 进度条展示用的当前百分比
    pub async fn display_percentage(&self) -> Option<f64> {
        self.state.lock().await.percentage
    }

    /// 界面「已保存/未保存」指示
    pub async fn is_saved(&self) -> bool {
        let state = self.state.lock().await;
        state.saved && !state.dirty
    }

    /// 幂等保存例程（四个触发源共用）
    ///
    /// 没有位置或索引未就绪时空操作；失败被吞掉只留指示，
    /// 绝不阻断阅读。
    pub async fn save_now(&self) {
        let (location, percentage) = {
            let state = self.state.lock().await;
            let Some(loc) = state.current.clone() else {
                return;
            };
            let Some(pct) = state.percentage else {
                // 索引未就绪，进度不可信，不落库
                return;
            };
            (loc, pct)
        };

        let pct_int = (percentage.round() as i64).clamp(0, 100);
        let result = self
            .store
            .save_progress(self.user_id, self.book_id, &location.encode(), pct_int)
            .await;

        let mut state = self.state.lock().await;
        match result {
            Ok(_) => {
                state.dirty = false;
                state.saved = true;
                debug!("[进度] 已保存: {}%", pct_int);
            }
            Err(e) => {
                state.saved = false;
                warn!("[进度] 保存失败（继续阅读）: {}", e);
            }
        }
    }

    /// 周期保存任务（书籍交互态期间运行，卸载时 abort）
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // 第一跳立即返回，跳过
            loop {
                ticker.tick().await;
                coordinator.save_now().await;
            }
        })
    }

    /// 页面/标签被隐藏：发射后不管，但返回句柄方便宿主在卸载前等它
    pub fn on_hidden(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.save_now().await;
        })
    }

    /// 组件卸载/导航离开前的最终保存（可等待）
    pub async fn on_teardown(&self) {
        self.save_now().await;
    }

    /// 显示模式切换前的保存：必须等保存完成再触发重排，避免丢位置
    pub async fn save_before_mode_switch(&self) {
        self.save_now().await;
    }

    /// 会话开始时恢复上次进度（返回持久化的位置字符串，由渲染面校验）
    pub async fn restore(&self) -> Option<String> {
        match self.store.get_progress(self.user_id, self.book_id).await {
            Ok(Some(progress)) => Some(progress.location),
            Ok(None) => None,
            Err(e) => {
                warn!("[进度] 读取历史进度失败: {}", e);
                None
            }
        }
    }
}
