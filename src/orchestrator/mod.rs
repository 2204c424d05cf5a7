//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量发布和调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `run_controller` - 运行控制器
//! - 校验选择（空选择、未知账号/文章、重复、已在运行中）
//! - 启动 / 停止运行，查询运行状态
//!
//! ### `scheduler` - 调度器
//! - 每个账号一个队列，同一账号串行
//! - 控制同时处理的账号数量（Semaphore）
//! - 为每个账号创建适配器，逐个执行 PublishFlow
//!
//! ### `selection` - 发布选择
//! - 按账号的 `publish_count` 分配文章
//!
//! ### `publish_log` - 发布日志
//! - 只追加的状态变化记录
//!
//! ## 层次关系
//!
//! ```text
//! run_controller (处理一次运行)
//!     ↓
//! scheduler (处理 Vec<AccountQueue>)
//!     ↓
//! workflow::PublishFlow (处理单个 PublishJob)
//!     ↓
//! adapters (平台适配：toutiao / sohu / baijiahao)
//!     ↓
//! infrastructure (基础设施：AutomationDriver、AccountLocks)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：run_controller 管运行，scheduler 管并发
//! 2. **向下依赖**：编排层 → workflow → adapters → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做平台相关判断

pub mod publish_log;
pub mod run_controller;
pub mod scheduler;
pub mod selection;

// 重新导出主要类型
pub use publish_log::PublishLog;
pub use run_controller::{JobSummary, RunController, RunHandle, RunState, RunStatus, StatusCounts};
pub use scheduler::Scheduler;
pub use selection::{distribute, find_duplicate, Selection};
