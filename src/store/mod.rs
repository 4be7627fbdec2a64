//! 后端持久化契约
//!
//! 阅读核心消费的查询/变更面。实际平台后端是外部协作方，这里用
//! trait 描述契约，并附带一个 SQLite 实现（单机宿主直接用，
//! 测试用内存库）。

pub mod sqlite;

pub use sqlite::SqliteStore;

use std::future::Future;
use std::pin::Pin;

use crate::error::ReaderError;
use crate::models::{Actor, Annotation, ReaderPreferences, ReadOnlyStatus, ReadingProgress};

/// 通用异步返回类型，统一封装后端接口
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 新建标注的参数
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub book_id: i64,
    pub group_id: Option<i64>,
    pub range_locator: String,
    pub selected_text: String,
    pub color: String,
    pub comment: Option<String>,
    pub group_visible: bool,
}

/// 阅读后端契约
///
/// 进度保存必须幂等且可容忍并发触发（同一内存位置的 last-write-wins）。
pub trait ReadingStore: Send + Sync {
    /// 当前进度，无记录返回 None
    fn get_progress(
        &self,
        user_id: i64,
        book_id: i64,
    ) -> BoxFuture<'_, Result<Option<ReadingProgress>, ReaderError>>;

    /// 保存进度（percentage 为 0-100 整数，调用频率每分钟至多数次）
    fn save_progress<'a>(
        &'a self,
        user_id: i64,
        book_id: i64,
        location: &'a str,
        percentage: i64,
    ) -> BoxFuture<'a, Result<(), ReaderError>>;

    /// 顶层标注列表（回复不出现在这里）
    fn list_annotations(&self, book_id: i64) -> BoxFuture<'_, Result<Vec<Annotation>, ReaderError>>;

    /// 某条标注的回复列表
    fn list_replies(
        &self,
        annotation_id: i64,
    ) -> BoxFuture<'_, Result<Vec<Annotation>, ReaderError>>;

    fn create_annotation(
        &self,
        actor: Actor,
        annotation: NewAnnotation,
    ) -> BoxFuture<'_, Result<i64, ReaderError>>;

    /// 回复：继承父标注的范围、颜色与可见性
    fn create_reply(
        &self,
        actor: Actor,
        parent_id: i64,
        comment: String,
    ) -> BoxFuture<'_, Result<i64, ReaderError>>;

    fn update_annotation(
        &self,
        actor: Actor,
        id: i64,
        comment: Option<String>,
        color: Option<String>,
    ) -> BoxFuture<'_, Result<(), ReaderError>>;

    /// 删除标注，级联删除其回复
    fn delete_annotation(&self, actor: Actor, id: i64) -> BoxFuture<'_, Result<(), ReaderError>>;

    fn get_preferences(&self, user_id: i64)
        -> BoxFuture<'_, Result<ReaderPreferences, ReaderError>>;

    fn update_preferences<'a>(
        &'a self,
        prefs: &'a ReaderPreferences,
    ) -> BoxFuture<'a, Result<(), ReaderError>>;

    /// 书籍对该用户是否只读（归档小组、截止日期），附原因
    fn is_book_read_only(
        &self,
        user_id: i64,
        book_id: i64,
    ) -> BoxFuture<'_, Result<ReadOnlyStatus, ReaderError>>;
}
