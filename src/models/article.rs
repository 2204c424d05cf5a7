use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 文章ID（来源文件名）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(String);

impl ArticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 文章（加载后只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub body: String,
    /// 可选的封面图片路径
    pub cover: Option<PathBuf>,
}

impl Article {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: ArticleId::new(id),
            title: title.into(),
            body: body.into(),
            cover: None,
        }
    }

    pub fn with_cover(mut self, cover: impl Into<PathBuf>) -> Self {
        self.cover = Some(cover.into());
        self
    }
}

/// 文章文件格式
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ArticleFile {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub cover: Option<PathBuf>,
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            crate::utils::logging::truncate_text(&self.title, 30),
            self.id
        )
    }
}
