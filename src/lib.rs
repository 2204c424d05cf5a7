//! # Self Media Publisher
//!
//! 多账号自媒体文章发布的编排核心（今日头条 / 搜狐号 / 百家号）
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `AutomationDriver` - 浏览器自动化契约（导航、执行脚本、导入导出登录状态）
//! - `JsExecutor` - 基于 chromiumoxide 的唯一 page owner
//! - `AccountLocks` - 同一账号同一时刻只有一个任务
//!
//! ### ② 业务能力层（Adapters / Session）
//! - `adapters/` - 每个平台一个适配器，只处理单篇文章
//! - `session/` - 按账号保存登录状态
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇文章发到一个账号"的完整流程
//! - `JobBoard` - 任务状态机与事件
//! - `PublishFlow` - 流程编排（登录 → 准备 → 提交）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/run_controller` - 启动、停止、查询一次运行
//! - `orchestrator/scheduler` - 按账号排队，控制并发
//!
//! ## 模块结构

pub mod adapters;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use adapters::{AdapterFactory, BrowserAdapterFactory, PlatformAdapter};
pub use config::Config;
pub use error::{AdapterError, AppError, ErrorKind};
pub use models::{Account, AccountId, Article, ArticleId, Platform, Session};
pub use orchestrator::{RunController, RunHandle, RunState, RunStatus};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
pub use workflow::{JobEvent, JobId, JobStatus, RunId};
