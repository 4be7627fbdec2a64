use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 书籍元信息（打开 EPUB 后提取）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub section_count: u32,
    /// data URL 形式的封面图
    pub cover_image: Option<String>,
}

/// 目录项（嵌套结构，location 为 spine 文档 href）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocItem {
    pub title: Option<String>,
    pub location: Option<String>,
    pub level: i32,
    #[serde(default)]
    pub children: Vec<TocItem>,
}

/// 派生章节：由目录 + spine 顺序计算，不落库
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub label: String,
    pub href: String,
    /// 解析到的 spine 序号，目录项未命中 spine 时为 None
    pub spine_index: Option<usize>,
    /// 起始百分比（0-100）
    pub start_percentage: f64,
    /// 结束百分比（0-100），等于下一章的起始
    pub end_percentage: f64,
}

/// 阅读进度（每用户每书一行）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReadingProgress {
    pub user_id: i64,
    pub book_id: i64,
    /// 不透明位置标识，仅对产生它的那本书有效
    pub location: String,
    /// 整数百分比 0-100
    pub percentage: i64,
    pub last_read_time: Option<i64>, // Unix timestamp
}

/// 标注（高亮 + 可选评论，parent_id 非空表示回复）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Annotation {
    pub id: Option<i64>,
    pub user_id: i64,
    pub book_id: i64,
    pub group_id: Option<i64>,
    /// 范围定位符，与位置标识同一语法，跨越起止偏移
    pub range_locator: String,
    pub selected_text: String,
    pub color: String,
    pub comment: Option<String>,
    /// 回复所属的顶层标注
    pub parent_id: Option<i64>,
    /// 是否对小组可见
    pub group_visible: bool,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl Annotation {
    /// 是否为回复（回复不出现在顶层列表）
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// 主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    Sepia,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Sepia => "sepia",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "sepia" => Some(Theme::Sepia),
            _ => None,
        }
    }

    /// 正文/背景颜色
    pub fn colors(&self) -> (&'static str, &'static str) {
        match self {
            Theme::Light => ("#1f1f1f", "#ffffff"),
            Theme::Dark => ("#d4d4d4", "#1e1e1e"),
            Theme::Sepia => ("#5b4636", "#f4ecd8"),
        }
    }
}

/// 阅读模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    /// 分页模式，章节按需加载
    Paginated,
    /// 连续滚动模式，需要预加载全部章节避免布局跳动
    Scrolled,
}

impl ReadingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingMode::Paginated => "paginated",
            ReadingMode::Scrolled => "scrolled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "paginated" => Some(ReadingMode::Paginated),
            "scrolled" => Some(ReadingMode::Scrolled),
            _ => None,
        }
    }
}

/// 阅读偏好（每用户一行，与书无关）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReaderPreferences {
    pub user_id: i64,
    pub font_size: i64,
    /// 行高按十倍整数存储（15 = 1.5）
    pub line_height: i64,
    pub font_family: String,
    pub theme: String,        // "light" / "dark" / "sepia"
    pub reading_mode: String, // "paginated" / "scrolled"
}

impl ReaderPreferences {
    pub fn defaults(user_id: i64) -> Self {
        Self {
            user_id,
            font_size: 16,
            line_height: 16,
            font_family: "serif".to_string(),
            theme: "light".to_string(),
            reading_mode: "paginated".to_string(),
        }
    }

    pub fn theme_enum(&self) -> Theme {
        Theme::from_str(&self.theme).unwrap_or(Theme::Light)
    }

    pub fn mode_enum(&self) -> ReadingMode {
        ReadingMode::from_str(&self.reading_mode).unwrap_or(ReadingMode::Paginated)
    }
}

/// 只读状态（归档小组、截止日期等）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOnlyStatus {
    pub read_only: bool,
    pub reason: Option<String>,
}

impl ReadOnlyStatus {
    pub fn writable() -> Self {
        Self {
            read_only: false,
            reason: None,
        }
    }
}

/// 操作发起者（权限判断用）
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i64,
    /// 是否为所属小组的管理员
    pub moderator: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_roundtrip() {
        assert_eq!(Theme::from_str("sepia"), Some(Theme::Sepia));
        assert_eq!(Theme::Sepia.as_str(), "sepia");
        assert_eq!(Theme::from_str("blue"), None);
    }

    #[test]
    fn test_reading_mode_parse() {
        assert_eq!(ReadingMode::from_str("scrolled"), Some(ReadingMode::Scrolled));
        assert_eq!(ReadingMode::from_str("vertical"), None);
    }

    #[test]
    fn test_reply_flag() {
        let mut a = Annotation {
            id: Some(1),
            user_id: 1,
            book_id: 1,
            group_id: None,
            range_locator: "v1:0:0:0-4".to_string(),
            selected_text: "text".to_string(),
            color: "yellow".to_string(),
            comment: None,
            parent_id: None,
            group_visible: true,
            created_at: None,
            updated_at: None,
        };
        assert!(!a.is_reply());
        a.parent_id = Some(9);
        assert!(a.is_reply());
    }
}
