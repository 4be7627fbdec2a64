//! EPUB 内容引擎
//! 从内存字节打开书籍，提取元数据、目录、spine 与章节内容

use std::collections::HashSet;
use std::io::Cursor;

use epub::doc::{EpubDoc, NavPoint};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{BookInfo, TocItem};

/// 章节内资源引用（epub:// 协议）
static RESOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"epub://([^"')\s>]+)"#).expect("资源引用正则非法"));

/// HTML 标签（正文文本提取用）
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("标签正则非法"));

/// <style>/<script> 整块剔除
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(style|script)[^>]*>.*?</(style|script)>").expect("块级正则非法")
});

/// 一个 spine 文档的准备结果
#[derive(Debug, Clone)]
pub struct PreparedSection {
    pub index: usize,
    /// spine 文档路径（href）
    pub path: String,
    /// 重写过资源引用的 HTML
    pub html: String,
    /// 去标签正文文本，位置索引与范围定位都基于它
    pub text: String,
    pub resource_refs: Vec<String>,
}

/// 章节引用到的资源（图片、样式表）
#[derive(Debug, Clone)]
pub struct PreparedResource {
    pub path: String,
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// 打开后的完整书籍内容
#[derive(Debug)]
pub struct BookContent {
    pub book_info: BookInfo,
    pub toc: Vec<TocItem>,
    pub spine: Vec<String>,
    pub sections: Vec<PreparedSection>,
    pub resources: Vec<PreparedResource>,
}

fn extract_metadata<R: std::io::Read + std::io::Seek>(
    doc: &mut EpubDoc<R>,
) -> (Option<String>, Option<String>, Option<String>, Option<String>, Option<String>) {
    let title = doc.mdata("title").map(|m| m.value.clone());
    let author = doc.mdata("creator").map(|m| m.value.clone());
    let description = doc
        .mdata("description")
        .or_else(|| doc.mdata("dc:description"))
        .map(|m| m.value.clone());
    let publisher = doc
        .mdata("publisher")
        .or_else(|| doc.mdata("dc:publisher"))
        .map(|m| m.value.clone());
    let language = doc
        .mdata("language")
        .or_else(|| doc.mdata("dc:language"))
        .map(|m| m.value.clone());

    (title, author, description, publisher, language)
}

fn extract_cover_data<R: std::io::Read + std::io::Seek>(doc: &mut EpubDoc<R>) -> Option<String> {
    use base64::{engine::general_purpose, Engine as _};

    let (bytes, mime) = match doc.get_cover() {
        Some((bytes, mime)) if !bytes.is_empty() => (bytes, mime),
        _ => return None,
    };

    let encoded = general_purpose::STANDARD.encode(&bytes);
    Some(format!("data:{};base64,{}", mime, encoded))
}

fn convert_toc_level(navpoints: &[NavPoint], level: i32) -> Vec<TocItem> {
    navpoints
        .iter()
        .map(|np| {
            let title = if np.label.is_empty() {
                None
            } else {
                Some(np.label.clone())
            };

            let location = Some(np.content.to_string_lossy().to_string());

            let children = convert_toc_level(&np.children, level + 1);

            TocItem {
                title,
                location,
                level,
                children,
            }
        })
        .collect()
}

fn convert_toc(navpoints: &[NavPoint]) -> Vec<TocItem> {
    convert_toc_level(navpoints, 0)
}

/// 去掉标签得到正文文本，实体只处理常见几个
pub fn strip_html(html: &str) -> String {
    let no_blocks = BLOCK_RE.replace_all(html, " ");
    let no_tags = TAG_RE.replace_all(&no_blocks, " ");
    let decoded = no_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    // 折叠空白，保持偏移在重排后稳定
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 重写章节 HTML 里的 epub:// 资源引用，并收集被引用资源
fn rewrite_resources<R: std::io::Read + std::io::Seek>(
    doc: &mut EpubDoc<R>,
    html_raw: &str,
    seen: &mut HashSet<String>,
    resources: &mut Vec<PreparedResource>,
) -> (String, Vec<String>) {
    let mut resource_refs: Vec<String> = Vec::new();

    for caps in RESOURCE_RE.captures_iter(html_raw) {
        if let Some(m) = caps.get(1) {
            let path = m.as_str().to_string();
            if !seen.contains(&path) {
                if let Some(data) = doc.get_resource_by_path(&path) {
                    let mime = doc
                        .get_resource_mime_by_path(&path)
                        .unwrap_or_else(|| "application/octet-stream".to_string());

                    resources.push(PreparedResource {
                        path: path.clone(),
                        data,
                        mime_type: mime,
                    });
                }
                seen.insert(path.clone());
            }
            if !resource_refs.contains(&path) {
                resource_refs.push(path);
            }
        }
    }

    let html = RESOURCE_RE
        .replace_all(html_raw, |caps: &regex::Captures| {
            format!("__BOOK_RES__:{}", &caps[1])
        })
        .into_owned();

    (html, resource_refs)
}

fn extract_sections<R: std::io::Read + std::io::Seek>(
    doc: &mut EpubDoc<R>,
) -> Result<(Vec<PreparedSection>, Vec<String>, Vec<PreparedResource>), String> {
    let total = doc.get_num_chapters();

    let mut sections = Vec::with_capacity(total);
    let mut spine = Vec::with_capacity(total);
    let mut resources = Vec::new();
    let mut seen_resources: HashSet<String> = HashSet::new();

    for index in 0..total {
        if !doc.set_current_page(index) {
            return Err(format!("设置章节 {} 失败", index));
        }

        let section_path = doc
            .get_current_path()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        spine.push(section_path.clone());

        let bytes = doc
            .get_current_with_epub_uris()
            .map_err(|e| format!("读取章节 {} 内容失败: {}", index, e))?;

        let html_raw = String::from_utf8(bytes)
            .map_err(|e| format!("章节 {} 不是有效的 UTF-8: {}", index, e))?;

        let (html, resource_refs) =
            rewrite_resources(doc, &html_raw, &mut seen_resources, &mut resources);
        let text = strip_html(&html_raw);

        sections.push(PreparedSection {
            index,
            path: section_path,
            html,
            text,
            resource_refs,
        });
    }

    Ok((sections, spine, resources))
}

/// 从内存字节打开书籍并提取全部内容
///
/// CPU 密集，调用方应放到 spawn_blocking 里执行。
pub fn open_book(bytes: Vec<u8>) -> Result<BookContent, String> {
    let mut doc =
        EpubDoc::from_reader(Cursor::new(bytes)).map_err(|e| format!("打开 EPUB 失败: {}", e))?;

    let (title, author, description, publisher, language) = extract_metadata(&mut doc);
    let cover_image = extract_cover_data(&mut doc);
    let section_count = doc.get_num_chapters() as u32;

    let book_info = BookInfo {
        title,
        author,
        description,
        publisher,
        language,
        section_count,
        cover_image,
    };

    let toc = convert_toc(&doc.toc);

    let (sections, spine, resources) = extract_sections(&mut doc)?;

    Ok(BookContent {
        book_info,
        toc,
        spine,
        sections,
        resources,
    })
}
