pub mod account_loader;
pub mod toml_loader;

pub use account_loader::load_accounts;
pub use toml_loader::{load_all_articles, load_toml_to_article};
