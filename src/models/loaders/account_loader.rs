use crate::error::ConfigError;
use crate::models::account::Account;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
}

/// 加载账号配置（`.toml` 或 `.json`）
///
/// 未知平台、非法ID、重复ID都在这里拒绝，而不是等到发布时。
pub async fn load_accounts(path: &Path) -> Result<Vec<Account>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidFile {
        path: path.display().to_string(),
        reason,
    };

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;

    let is_json = path.extension().and_then(|s| s.to_str()) == Some("json");
    let accounts = parse_accounts(&content, is_json).map_err(invalid)?;

    let mut seen = HashSet::new();
    for account in &accounts {
        if !seen.insert(account.id.clone()) {
            return Err(ConfigError::DuplicateAccountId(account.id.to_string()));
        }
    }

    tracing::info!("✓ 加载 {} 个账号: {}", accounts.len(), path.display());
    Ok(accounts)
}

fn parse_accounts(content: &str, is_json: bool) -> Result<Vec<Account>, String> {
    let file: AccountsFile = if is_json {
        serde_json::from_str(content).map_err(|e| e.to_string())?
    } else {
        toml::from_str(content).map_err(|e| e.to_string())?
    };
    Ok(file.accounts)
}
