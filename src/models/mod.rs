pub mod account;
pub mod article;
pub mod loaders;
pub mod session;

pub use account::{Account, AccountId, Platform};
pub use article::{Article, ArticleId};
pub use loaders::{load_accounts, load_all_articles, load_toml_to_article};
pub use session::Session;
