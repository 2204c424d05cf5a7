//! 发布选择构建
//!
//! 按账号顺序为每个启用的账号分配 `publish_count` 篇尚未使用的文章。

use std::collections::HashSet;
use tracing::warn;

use crate::models::{Account, AccountId, Article, ArticleId};

/// 一次运行选择的 (账号, 文章) 列表
pub type Selection = Vec<(AccountId, ArticleId)>;

/// 按账号依次分配文章，文章用完时停止
pub fn distribute(accounts: &[Account], articles: &[Article]) -> Selection {
    let mut selection = Vec::new();
    let mut remaining = articles.iter();

    'accounts: for account in accounts.iter().filter(|a| a.enabled) {
        for _ in 0..account.publish_count {
            let Some(article) = remaining.next() else {
                warn!(
                    "⚠️ 文章数量不足，[{}] 及之后的账号未分配完",
                    account.display_name
                );
                break 'accounts;
            };
            selection.push((account.id.clone(), article.id.clone()));
        }
    }
    selection
}

/// 选择中第一个重复的 (账号, 文章)
pub fn find_duplicate(selection: &[(AccountId, ArticleId)]) -> Option<&(AccountId, ArticleId)> {
    let mut seen = HashSet::new();
    selection.iter().find(|pair| !seen.insert(*pair))
}
