//! SQLite 后端实现

use sqlx::SqlitePool;

use super::{BoxFuture, NewAnnotation, ReadingStore};
use crate::error::ReaderError;
use crate::models::{Actor, Annotation, ReaderPreferences, ReadOnlyStatus, ReadingProgress};

/// SQLite 持久化
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> SqliteStore {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 建表
    pub async fn init_schema(&self) -> Result<(), ReaderError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reading_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                book_id INTEGER NOT NULL,
                archived INTEGER DEFAULT 0,
                deadline INTEGER,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS group_members (
                group_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                role TEXT DEFAULT 'member',
                PRIMARY KEY (group_id, user_id),
                FOREIGN KEY (group_id) REFERENCES reading_groups(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reading_progress (
                user_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                location TEXT NOT NULL,
                percentage INTEGER NOT NULL DEFAULT 0,
                last_read_time INTEGER,
                PRIMARY KEY (user_id, book_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS annotations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                group_id INTEGER,
                range_locator TEXT NOT NULL,
                selected_text TEXT NOT NULL,
                color TEXT NOT NULL DEFAULT 'yellow',
                comment TEXT,
                parent_id INTEGER,
                group_visible INTEGER DEFAULT 1,
                created_at INTEGER DEFAULT (strftime('%s', 'now')),
                updated_at INTEGER,
                FOREIGN KEY (parent_id) REFERENCES annotations(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reader_preferences (
                user_id INTEGER PRIMARY KEY,
                font_size INTEGER NOT NULL DEFAULT 16,
                line_height INTEGER NOT NULL DEFAULT 16,
                font_family TEXT NOT NULL DEFAULT 'serif',
                theme TEXT NOT NULL DEFAULT 'light',
                reading_mode TEXT NOT NULL DEFAULT 'paginated'
            )",
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_annotations_book ON annotations(book_id, parent_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_annotations_parent ON annotations(parent_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_groups_book ON reading_groups(book_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 目标小组是否仍可写（归档与截止日期检查）
    ///
    /// 标注绑定的小组单独判定，不看用户在这本书上的其他小组。
    async fn check_group_writable(&self, group_id: i64) -> Result<(), ReaderError> {
        let row: Option<(i64, Option<i64>)> =
            sqlx::query_as("SELECT archived, deadline FROM reading_groups WHERE id = ?")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((archived, deadline)) = row else {
            return Err(ReaderError::Message(format!("小组不存在: {}", group_id)));
        };
        if archived != 0 {
            return Err(ReaderError::ReadOnly("小组已归档".to_string()));
        }
        if let Some(deadline) = deadline {
            if chrono::Utc::now().timestamp() > deadline {
                return Err(ReaderError::ReadOnly("阅读截止日期已过".to_string()));
            }
        }
        Ok(())
    }

    /// 标注变更的权限检查
    ///
    /// 归档小组阻止一切变更，唯一例外是管理员发起的删除（deleting=true）。
    async fn check_mutation_allowed(
        &self,
        actor: Actor,
        annotation: &Annotation,
        deleting: bool,
    ) -> Result<(), ReaderError> {
        if let Some(group_id) = annotation.group_id {
            if !(deleting && actor.moderator) {
                self.check_group_writable(group_id).await?;
            }
        }

        // 非本人：只有管理员能删，谁都不能改
        if annotation.user_id != actor.user_id {
            if deleting && actor.moderator {
                return Ok(());
            }
            return Err(ReaderError::ReadOnly("只能修改自己的标注".to_string()));
        }
        Ok(())
    }

    async fn fetch_annotation(&self, id: i64) -> Result<Annotation, ReaderError> {
        sqlx::query_as::<_, Annotation>("SELECT * FROM annotations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReaderError::Message(format!("标注不存在: {}", id)))
    }

    async fn read_only_status(
        &self,
        user_id: i64,
        book_id: i64,
    ) -> Result<ReadOnlyStatus, ReaderError> {
        // 用户在这本书上加入的小组
        let rows: Vec<(i64, Option<i64>)> = sqlx::query_as(
            "SELECT g.archived, g.deadline FROM reading_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE g.book_id = ? AND m.user_id = ?",
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            // 无小组关系，个人阅读不受限
            return Ok(ReadOnlyStatus::writable());
        }

        let now = chrono::Utc::now().timestamp();
        // 任何一个小组仍可写就不算只读
        let mut reason = None;
        for (archived, deadline) in &rows {
            if *archived != 0 {
                reason = Some("小组已归档".to_string());
                continue;
            }
            if let Some(d) = deadline {
                if now > *d {
                    reason = Some("阅读截止日期已过".to_string());
                    continue;
                }
            }
            return Ok(ReadOnlyStatus::writable());
        }

        Ok(ReadOnlyStatus {
            read_only: true,
            reason,
        })
    }
}

impl ReadingStore for SqliteStore {
    fn get_progress(
        &self,
        user_id: i64,
        book_id: i64,
    ) -> BoxFuture<'_, Result<Option<ReadingProgress>, ReaderError>> {
        Box::pin(async move {
            let progress = sqlx::query_as::<_, ReadingProgress>(
                "SELECT * FROM reading_progress WHERE user_id = ? AND book_id = ?",
            )
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(progress)
        })
    }

    fn save_progress<'a>(
        &'a self,
        user_id: i64,
        book_id: i64,
        location: &'a str,
        percentage: i64,
    ) -> BoxFuture<'a, Result<(), ReaderError>> {
        Box::pin(async move {
            let pct = percentage.clamp(0, 100);
            sqlx::query(
                "INSERT INTO reading_progress (user_id, book_id, location, percentage, last_read_time)
                 VALUES (?, ?, ?, ?, strftime('%s', 'now'))
                 ON CONFLICT(user_id, book_id) DO UPDATE SET
                     location = excluded.location,
                     percentage = excluded.percentage,
                     last_read_time = excluded.last_read_time",
            )
            .bind(user_id)
            .bind(book_id)
            .bind(location)
            .bind(pct)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn list_annotations(
        &self,
        book_id: i64,
    ) -> BoxFuture<'_, Result<Vec<Annotation>, ReaderError>> {
        Box::pin(async move {
            let annotations = sqlx::query_as::<_, Annotation>(
                "SELECT * FROM annotations WHERE book_id = ? AND parent_id IS NULL
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(book_id)
            .fetch_all(&self.pool)
            .await?;

            Ok(annotations)
        })
    }

    fn list_replies(
        &self,
        annotation_id: i64,
    ) -> BoxFuture<'_, Result<Vec<Annotation>, ReaderError>> {
        Box::pin(async move {
            let replies = sqlx::query_as::<_, Annotation>(
                "SELECT * FROM annotations WHERE parent_id = ? ORDER BY created_at ASC, id ASC",
            )
            .bind(annotation_id)
            .fetch_all(&self.pool)
            .await?;

            Ok(replies)
        })
    }

    fn create_annotation(
        &self,
        actor: Actor,
        annotation: NewAnnotation,
    ) -> BoxFuture<'_, Result<i64, ReaderError>> {
        Box::pin(async move {
            // 绑定小组的标注按目标小组判定，个人标注按用户聚合状态判定
            match annotation.group_id {
                Some(group_id) => self.check_group_writable(group_id).await?,
                None => {
                    let status = self
                        .read_only_status(actor.user_id, annotation.book_id)
                        .await?;
                    if status.read_only {
                        return Err(ReaderError::ReadOnly(
                            status.reason.unwrap_or_else(|| "只读".to_string()),
                        ));
                    }
                }
            }

            let result = sqlx::query(
                "INSERT INTO annotations
                     (user_id, book_id, group_id, range_locator, selected_text, color, comment, group_visible)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(actor.user_id)
            .bind(annotation.book_id)
            .bind(annotation.group_id)
            .bind(&annotation.range_locator)
            .bind(&annotation.selected_text)
            .bind(&annotation.color)
            .bind(&annotation.comment)
            .bind(annotation.group_visible)
            .execute(&self.pool)
            .await?;

            Ok(result.last_insert_rowid())
        })
    }

    fn create_reply(
        &self,
        actor: Actor,
        parent_id: i64,
        comment: String,
    ) -> BoxFuture<'_, Result<i64, ReaderError>> {
        Box::pin(async move {
            let parent = self.fetch_annotation(parent_id).await?;
            if parent.is_reply() {
                return Err(ReaderError::Message("不能回复一条回复".to_string()));
            }

            // 回复落在父标注所属的小组里，按该小组判定
            match parent.group_id {
                Some(group_id) => self.check_group_writable(group_id).await?,
                None => {
                    let status = self.read_only_status(actor.user_id, parent.book_id).await?;
                    if status.read_only {
                        return Err(ReaderError::ReadOnly(
                            status.reason.unwrap_or_else(|| "只读".to_string()),
                        ));
                    }
                }
            }

            // 回复继承父标注的范围、颜色与可见性
            let result = sqlx::query(
                "INSERT INTO annotations
                     (user_id, book_id, group_id, range_locator, selected_text, color, comment, parent_id, group_visible)
                 VALUES (?, ?, ?, ?, '', ?, ?, ?, ?)",
            )
            .bind(actor.user_id)
            .bind(parent.book_id)
            .bind(parent.group_id)
            .bind(&parent.range_locator)
            .bind(&parent.color)
            .bind(&comment)
            .bind(parent_id)
            .bind(parent.group_visible)
            .execute(&self.pool)
            .await?;

            Ok(result.last_insert_rowid())
        })
    }

    fn update_annotation(
        &self,
        actor: Actor,
        id: i64,
        comment: Option<String>,
        color: Option<String>,
    ) -> BoxFuture<'_, Result<(), ReaderError>> {
        Box::pin(async move {
            let annotation = self.fetch_annotation(id).await?;
            self.check_mutation_allowed(actor, &annotation, false).await?;

            sqlx::query(
                "UPDATE annotations SET
                     comment = COALESCE(?, comment),
                     color = COALESCE(?, color),
                     updated_at = strftime('%s', 'now')
                 WHERE id = ?",
            )
            .bind(comment)
            .bind(color)
            .bind(id)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn delete_annotation(&self, actor: Actor, id: i64) -> BoxFuture<'_, Result<(), ReaderError>> {
        Box::pin(async move {
            let annotation = self.fetch_annotation(id).await?;
            self.check_mutation_allowed(actor, &annotation, true).await?;

            // 显式级联，不依赖外键配置
            sqlx::query("DELETE FROM annotations WHERE parent_id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            sqlx::query("DELETE FROM annotations WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }

    fn get_preferences(
        &self,
        user_id: i64,
    ) -> BoxFuture<'_, Result<ReaderPreferences, ReaderError>> {
        Box::pin(async move {
            let prefs = sqlx::query_as::<_, ReaderPreferences>(
                "SELECT * FROM reader_preferences WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(prefs.unwrap_or_else(|| ReaderPreferences::defaults(user_id)))
        })
    }

    fn update_preferences<'a>(
        &'a self,
        prefs: &'a ReaderPreferences,
    ) -> BoxFuture<'a, Result<(), ReaderError>> {
        Box::pin(async move {
            if crate::models::Theme::from_str(&prefs.theme).is_none() {
                return Err(ReaderError::Message("Invalid theme".to_string()));
            }
            if crate::models::ReadingMode::from_str(&prefs.reading_mode).is_none() {
                return Err(ReaderError::Message("Invalid reading mode".to_string()));
            }

            sqlx::query(
                "INSERT INTO reader_preferences
                     (user_id, font_size, line_height, font_family, theme, reading_mode)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET
                     font_size = excluded.font_size,
                     line_height = excluded.line_height,
                     font_family = excluded.font_family,
                     theme = excluded.theme,
                     reading_mode = excluded.reading_mode",
            )
            .bind(prefs.user_id)
            .bind(prefs.font_size)
            .bind(prefs.line_height)
            .bind(&prefs.font_family)
            .bind(&prefs.theme)
            .bind(&prefs.reading_mode)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn is_book_read_only(
        &self,
        user_id: i64,
        book_id: i64,
    ) -> BoxFuture<'_, Result<ReadOnlyStatus, ReaderError>> {
        Box::pin(async move { self.read_only_status(user_id, book_id).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn member(user_id: i64) -> Actor {
        Actor {
            user_id,
            moderator: false,
        }
    }

    fn moderator(user_id: i64) -> Actor {
        Actor {
            user_id,
            moderator: true,
        }
    }

    fn new_annotation(book_id: i64, group_id: Option<i64>) -> NewAnnotation {
        NewAnnotation {
            book_id,
            group_id,
            range_locator: "v1:0123456789abcdef:1:10-25".to_string(),
            selected_text: "选中的文字".to_string(),
            color: "yellow".to_string(),
            comment: Some("批注".to_string()),
            group_visible: true,
        }
    }

    async fn setup_group(store: &SqliteStore, book_id: i64, users: &[(i64, &str)]) -> i64 {
        let result = sqlx::query("INSERT INTO reading_groups (name, book_id) VALUES ('读书会', ?)")
            .bind(book_id)
            .execute(store.pool())
            .await
            .unwrap();
        let gid = result.last_insert_rowid();
        for (uid, role) in users {
            sqlx::query("INSERT INTO group_members (group_id, user_id, role) VALUES (?, ?, ?)")
                .bind(gid)
                .bind(uid)
                .bind(role)
                .execute(store.pool())
                .await
                .unwrap();
        }
        gid
    }

    async fn archive_group(store: &SqliteStore, group_id: i64) {
        sqlx::query("UPDATE reading_groups SET archived = 1 WHERE id = ?")
            .bind(group_id)
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_progress_upsert_idempotent() {
        let store = test_store().await;
        assert!(store.get_progress(1, 7).await.unwrap().is_none());

        store
            .save_progress(1, 7, "v1:0123456789abcdef:2:100", 42)
            .await
            .unwrap();
        // 同一状态重复保存结果不变
        store
            .save_progress(1, 7, "v1:0123456789abcdef:2:100", 42)
            .await
            .unwrap();

        let progress = store.get_progress(1, 7).await.unwrap().unwrap();
        assert_eq!(progress.location, "v1:0123456789abcdef:2:100");
        assert_eq!(progress.percentage, 42);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reading_progress")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_progress_percentage_clamped() {
        let store = test_store().await;
        store
            .save_progress(1, 7, "v1:0123456789abcdef:0:0", 250)
            .await
            .unwrap();
        let progress = store.get_progress(1, 7).await.unwrap().unwrap();
        assert_eq!(progress.percentage, 100);
    }

    #[tokio::test]
    async fn test_replies_excluded_from_top_level() {
        let store = test_store().await;
        let id = store
            .create_annotation(member(1), new_annotation(7, None))
            .await
            .unwrap();
        store
            .create_reply(member(2), id, "同感".to_string())
            .await
            .unwrap();

        let top = store.list_annotations(7).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, Some(id));

        let replies = store.list_replies(id).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent_id, Some(id));
    }

    #[tokio::test]
    async fn test_reply_inherits_parent_fields() {
        let store = test_store().await;
        let gid = setup_group(&store, 7, &[(1, "member"), (2, "member")]).await;
        let mut ann = new_annotation(7, Some(gid));
        ann.color = "green".to_string();
        let id = store.create_annotation(member(1), ann).await.unwrap();

        let reply_id = store
            .create_reply(member(2), id, "回复".to_string())
            .await
            .unwrap();
        let replies = store.list_replies(id).await.unwrap();
        let reply = replies.iter().find(|r| r.id == Some(reply_id)).unwrap();
        assert_eq!(reply.range_locator, "v1:0123456789abcdef:1:10-25");
        assert_eq!(reply.color, "green");
        assert!(reply.group_visible);
        assert_eq!(reply.group_id, Some(gid));
    }

    #[tokio::test]
    async fn test_reply_to_reply_rejected() {
        let store = test_store().await;
        let id = store
            .create_annotation(member(1), new_annotation(7, None))
            .await
            .unwrap();
        let reply_id = store
            .create_reply(member(1), id, "一层".to_string())
            .await
            .unwrap();
        let result = store.create_reply(member(1), reply_id, "二层".to_string()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let store = test_store().await;
        let id = store
            .create_annotation(member(1), new_annotation(7, None))
            .await
            .unwrap();
        store.create_reply(member(2), id, "a".to_string()).await.unwrap();
        store.create_reply(member(3), id, "b".to_string()).await.unwrap();

        store.delete_annotation(member(1), id).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM annotations")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_archived_group_blocks_author_allows_moderator_delete() {
        // 小组归档后：作者改删都被拒，管理员仍可删除
        let store = test_store().await;
        let gid = setup_group(&store, 7, &[(1, "member"), (9, "moderator")]).await;
        let id = store
            .create_annotation(member(1), new_annotation(7, Some(gid)))
            .await
            .unwrap();

        archive_group(&store, gid).await;

        let update = store
            .update_annotation(member(1), id, Some("改".to_string()), None)
            .await;
        assert!(matches!(update, Err(ReaderError::ReadOnly(_))));

        let delete = store.delete_annotation(member(1), id).await;
        assert!(matches!(delete, Err(ReaderError::ReadOnly(_))));

        store.delete_annotation(moderator(9), id).await.unwrap();
        assert!(store.list_annotations(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_archived_group_blocks_creation() {
        let store = test_store().await;
        let gid = setup_group(&store, 7, &[(1, "member")]).await;
        archive_group(&store, gid).await;

        let status = store.is_book_read_only(1, 7).await.unwrap();
        assert!(status.read_only);
        assert_eq!(status.reason.as_deref(), Some("小组已归档"));

        let result = store
            .create_annotation(member(1), new_annotation(7, Some(gid)))
            .await;
        assert!(matches!(result, Err(ReaderError::ReadOnly(_))));
    }

    #[tokio::test]
    async fn test_archived_group_rejects_creation_despite_other_live_group() {
        // 用户同时在归档小组与在行小组里：聚合状态可写，
        // 但绑定归档小组的标注仍然必须被拒
        let store = test_store().await;
        let archived_gid = setup_group(&store, 7, &[(1, "member")]).await;
        let live_gid = setup_group(&store, 7, &[(1, "member")]).await;
        archive_group(&store, archived_gid).await;

        assert!(!store.is_book_read_only(1, 7).await.unwrap().read_only);

        let result = store
            .create_annotation(member(1), new_annotation(7, Some(archived_gid)))
            .await;
        assert!(matches!(result, Err(ReaderError::ReadOnly(_))));

        // 在行小组照常可建
        store
            .create_annotation(member(1), new_annotation(7, Some(live_gid)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reply_into_archived_group_rejected() {
        let store = test_store().await;
        let gid = setup_group(&store, 7, &[(1, "member"), (2, "member")]).await;
        let _live_gid = setup_group(&store, 7, &[(2, "member")]).await;
        let id = store
            .create_annotation(member(1), new_annotation(7, Some(gid)))
            .await
            .unwrap();
        archive_group(&store, gid).await;

        // 回复人还有在行小组，但父标注的小组已归档
        let result = store.create_reply(member(2), id, "迟到".to_string()).await;
        assert!(matches!(result, Err(ReaderError::ReadOnly(_))));
    }

    #[tokio::test]
    async fn test_passed_deadline_is_read_only() {
        let store = test_store().await;
        let gid = setup_group(&store, 7, &[(1, "member")]).await;
        sqlx::query("UPDATE reading_groups SET deadline = 1000 WHERE id = ?")
            .bind(gid)
            .execute(store.pool())
            .await
            .unwrap();

        let status = store.is_book_read_only(1, 7).await.unwrap();
        assert!(status.read_only);
        assert_eq!(status.reason.as_deref(), Some("阅读截止日期已过"));
    }

    #[tokio::test]
    async fn test_no_group_is_writable() {
        let store = test_store().await;
        let status = store.is_book_read_only(1, 7).await.unwrap();
        assert!(!status.read_only);
    }

    #[tokio::test]
    async fn test_update_only_own_annotation() {
        let store = test_store().await;
        let id = store
            .create_annotation(member(1), new_annotation(7, None))
            .await
            .unwrap();
        let result = store
            .update_annotation(member(2), id, Some("别人的".to_string()), None)
            .await;
        assert!(matches!(result, Err(ReaderError::ReadOnly(_))));
    }

    #[tokio::test]
    async fn test_preferences_roundtrip_and_validation() {
        let store = test_store().await;
        // 无记录返回默认值
        let prefs = store.get_preferences(5).await.unwrap();
        assert_eq!(prefs.font_size, 16);

        let mut updated = prefs.clone();
        updated.font_size = 20;
        updated.theme = "sepia".to_string();
        updated.reading_mode = "scrolled".to_string();
        store.update_preferences(&updated).await.unwrap();

        let reloaded = store.get_preferences(5).await.unwrap();
        assert_eq!(reloaded.font_size, 20);
        assert_eq!(reloaded.theme, "sepia");

        let mut bad = reloaded.clone();
        bad.theme = "neon".to_string();
        assert!(store.update_preferences(&bad).await.is_err());
    }
}
