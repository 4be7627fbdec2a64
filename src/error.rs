//! 阅读核心统一错误类型

/// 阅读核心错误
///
/// 错误分类对应各自的处理策略：加载类错误需要向用户展示并提供重试；
/// 位置失效类错误由渲染面自愈；持久化失败只翻转「未保存」指示，不打断阅读。
#[derive(Debug)]
pub enum ReaderError {
    /// 网络/读取失败，书籍字节未取到
    Fetch(String),
    /// 书籍文件为空
    EmptyFile,
    /// 文件不是 ZIP 结构的 EPUB
    InvalidFormat(String),
    /// EPUB 解析或导航失败
    Engine(String),
    /// 数据库错误
    Database(sqlx::Error),
    /// 只读拒绝（归档小组、截止日期已过等），携带原因
    ReadOnly(String),
    /// 其他错误
    Message(String),
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::Fetch(e) => write!(f, "获取书籍内容失败: {}", e),
            ReaderError::EmptyFile => write!(f, "书籍文件为空"),
            ReaderError::InvalidFormat(e) => write!(f, "文件格式不正确: {}", e),
            ReaderError::Engine(e) => write!(f, "渲染引擎错误: {}", e),
            ReaderError::Database(e) => write!(f, "Database error: {}", e),
            ReaderError::ReadOnly(reason) => write!(f, "只读状态，禁止修改: {}", reason),
            ReaderError::Message(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ReaderError {}

impl From<sqlx::Error> for ReaderError {
    fn from(error: sqlx::Error) -> Self {
        ReaderError::Database(error)
    }
}

impl From<String> for ReaderError {
    fn from(error: String) -> Self {
        ReaderError::Message(error)
    }
}

impl serde::Serialize for ReaderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl ReaderError {
    /// 是否属于可自愈的「章节不存在」类错误
    pub fn is_section_not_found(&self) -> bool {
        match self {
            ReaderError::Engine(msg) => {
                msg.contains("section not found") || msg.contains("章节不存在")
            }
            _ => false,
        }
    }
}
