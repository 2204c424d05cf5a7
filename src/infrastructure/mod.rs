pub mod account_locks;
pub mod driver;
pub mod js_executor;

pub use account_locks::AccountLocks;
pub use driver::AutomationDriver;
pub use js_executor::JsExecutor;
