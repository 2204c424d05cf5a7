use crate::models::article::{Article, ArticleFile, ArticleId};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载一篇文章，文件名（不含扩展名）作为文章ID
pub async fn load_toml_to_article(toml_file_path: &Path) -> Result<Article> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let file: ArticleFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    let id = toml_file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("无效的文件名: {}", toml_file_path.display()))?;

    // 相对路径的封面以文章文件所在目录为基准
    let cover = file.cover.map(|cover| match toml_file_path.parent() {
        Some(dir) if cover.is_relative() => dir.join(cover),
        _ => cover,
    });

    Ok(Article {
        id: ArticleId::new(id),
        title: file.title,
        body: file.body,
        cover,
    })
}

/// 从文件夹中加载所有 TOML 文章，按文件名排序
pub async fn load_all_articles(folder_path: &str) -> Result<Vec<Article>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut articles = Vec::with_capacity(toml_files.len());
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_to_article(&path).await {
            Ok(article) => {
                tracing::debug!("成功加载文章: {}", article);
                articles.push(article);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_all_articles_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.toml"),
            "title = \"第二篇\"\nbody = \"正文二\"\ncover = \"cover.png\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("a.toml"), "title = \"第一篇\"\nbody = \"正文一\"\n").unwrap();
        std::fs::write(dir.path().join("broken.toml"), "title = ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let articles = load_all_articles(dir.path().to_str().unwrap()).await.unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].id.as_str(), "a");
        assert_eq!(articles[0].cover, None);
        assert_eq!(articles[1].title, "第二篇");
        assert_eq!(articles[1].cover, Some(dir.path().join("cover.png")));
    }

    #[tokio::test]
    async fn test_missing_folder_is_error() {
        assert!(load_all_articles("/definitely/not/here").await.is_err());
    }
}
