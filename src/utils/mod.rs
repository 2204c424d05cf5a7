pub mod logging;

pub use logging::{log_run_summary, log_startup, truncate_text};
