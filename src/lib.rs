pub mod anchors;
pub mod chapters;
pub mod engine;
pub mod error;
pub mod locator;
pub mod models;
pub mod panel;
pub mod progress;
pub mod store;
pub mod surface;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::SqlitePool;

pub use anchors::{AnchorManager, AppliedAnchor, ApplyOutcome, LayoutMetrics, Rect};
pub use chapters::ChapterIndex;
pub use engine::{open_book, BookContent, PreparedSection};
pub use error::ReaderError;
pub use locator::{
    book_hash, is_location_valid, location_from_percentage, percentage_from_location, Location,
    LocationIndex, RangeLocator,
};
pub use models::{
    Actor, Annotation, BookInfo, Chapter, ReaderPreferences, ReadingMode, ReadingProgress,
    ReadOnlyStatus, Theme, TocItem,
};
pub use panel::{AnnotationsPanel, Grouping, PanelEntry, PanelGroup, ScrollTarget};
pub use progress::ProgressCoordinator;
pub use store::{sqlite::SqliteStore, NewAnnotation, ReadingStore};
pub use surface::{
    BookFetcher, EngineErrorKind, FileFetcher, NavTarget, RenderSurface, StyledSection,
    SurfaceEvent, SurfaceState,
};

/// 打开（必要时创建）SQLite 连接池并建表
///
/// sqlx 对 SQLite 推荐使用 sqlite:// 前缀，并使用正斜杠路径格式。
pub async fn open_database(path: &str) -> Result<SqlitePool, ReaderError> {
    let db_path = path.replace('\\', "/");
    let database_url = format!("sqlite://{}?mode=rwc", db_path);
    let opts = SqliteConnectOptions::from_str(&database_url)
        .map_err(|e| ReaderError::Message(format!("数据库路径无效: {}", e)))?
        .journal_mode(SqliteJournalMode::Wal)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let store = SqliteStore::new(pool.clone());
    store.init_schema().await?;
    Ok(pool)
}
