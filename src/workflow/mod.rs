//! 流程层（Workflow Layer）
//!
//! 定义单个发布任务的状态机和完整流程，不关心批量调度。

pub mod board;
pub mod job;
pub mod publish_flow;
pub mod stop;

pub use board::{JobBoard, JobEvents, TransitionSink};
pub use job::{
    InvalidTransition, JobEvent, JobFailure, JobId, JobStatus, JobTransition, PublishJob, RunId,
};
pub use publish_flow::PublishFlow;
pub use stop::StopSignal;
