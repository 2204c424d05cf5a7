use rand::Rng;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时发布的账号数量
    pub max_concurrent_accounts: usize,
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 是否自行启动浏览器（否则连接已打开的浏览器）
    pub launch_browser: bool,
    /// 自行启动时是否使用无头模式
    pub headless: bool,
    /// 浏览器可执行文件路径
    pub chrome_executable: Option<String>,
    /// 账号配置文件
    pub accounts_file: String,
    /// 文章 TOML 存放目录
    pub articles_folder: String,
    /// 登录状态存放目录
    pub session_dir: String,
    /// 发布记录文件
    pub publish_log_file: String,
    /// 网络异常时的最大重试次数
    pub max_submit_retries: u32,
    /// 首次重试等待时间（毫秒），之后指数增长
    pub retry_base_delay_ms: u64,
    /// 单次重试等待上限（毫秒）
    pub retry_max_delay_ms: u64,
    /// 手动登录等待上限（秒）
    pub login_timeout_secs: u64,
    /// 登录轮询间隔（毫秒）
    pub login_poll_interval_ms: u64,
    /// 页面操作超时（秒）
    pub page_timeout_secs: u64,
    /// 同一账号两篇文章之间的间隔（毫秒）
    pub job_interval_ms: u64,
    /// 任务间隔上随机增加的最大时长（毫秒）
    pub job_interval_jitter_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_accounts: 2,
            browser_debug_port: 9222,
            launch_browser: false,
            headless: false,
            chrome_executable: None,
            accounts_file: "data/accounts.toml".to_string(),
            articles_folder: "data/articles".to_string(),
            session_dir: "data/browser_profiles".to_string(),
            publish_log_file: "data/publish_log.jsonl".to_string(),
            max_submit_retries: 3,
            retry_base_delay_ms: 2000,
            retry_max_delay_ms: 30_000,
            login_timeout_secs: 300,
            login_poll_interval_ms: 1000,
            page_timeout_secs: 30,
            job_interval_ms: 3000,
            job_interval_jitter_ms: 5000,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        Ok(Self {
            max_concurrent_accounts: env_or("MAX_CONCURRENT_ACCOUNTS", default.max_concurrent_accounts)?
                .max(1),
            browser_debug_port: env_or("BROWSER_DEBUG_PORT", default.browser_debug_port)?,
            launch_browser: env_or("LAUNCH_BROWSER", default.launch_browser)?,
            headless: env_or("HEADLESS", default.headless)?,
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            accounts_file: std::env::var("ACCOUNTS_FILE").unwrap_or(default.accounts_file),
            articles_folder: std::env::var("ARTICLES_FOLDER").unwrap_or(default.articles_folder),
            session_dir: std::env::var("SESSION_DIR").unwrap_or(default.session_dir),
            publish_log_file: std::env::var("PUBLISH_LOG_FILE").unwrap_or(default.publish_log_file),
            max_submit_retries: env_or("MAX_SUBMIT_RETRIES", default.max_submit_retries)?,
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", default.retry_base_delay_ms)?,
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", default.retry_max_delay_ms)?,
            login_timeout_secs: env_or("LOGIN_TIMEOUT_SECS", default.login_timeout_secs)?,
            login_poll_interval_ms: env_or("LOGIN_POLL_INTERVAL_MS", default.login_poll_interval_ms)?,
            page_timeout_secs: env_or("PAGE_TIMEOUT_SECS", default.page_timeout_secs)?,
            job_interval_ms: env_or("JOB_INTERVAL_MS", default.job_interval_ms)?,
            job_interval_jitter_ms: env_or("JOB_INTERVAL_JITTER_MS", default.job_interval_jitter_ms)?,
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging)?,
        })
    }

    /// 调度器配置
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_accounts: self.max_concurrent_accounts.max(1),
            retry: RetryPolicy {
                max_submit_retries: self.max_submit_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
            },
            job_interval: Duration::from_millis(self.job_interval_ms),
            job_interval_jitter: Duration::from_millis(self.job_interval_jitter_ms),
        }
    }

    /// 适配器配置
    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            login_timeout: Duration::from_secs(self.login_timeout_secs),
            poll_interval: Duration::from_millis(self.login_poll_interval_ms.max(1)),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
        }
    }
}

/// 调度器配置
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub max_concurrent_accounts: usize,
    pub retry: RetryPolicy,
    pub job_interval: Duration,
    pub job_interval_jitter: Duration,
}

impl SchedulerConfig {
    /// 下一次任务前的等待时间：固定间隔加随机抖动
    pub fn next_interval(&self) -> Duration {
        let jitter_ms = self.job_interval_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.job_interval;
        }
        self.job_interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Config::default().scheduler()
    }
}

/// 网络异常重试策略
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次提交之外最多再重试的次数
    pub max_submit_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 第 `retry` 次重试（从 1 开始）前的等待时间
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// 适配器配置
#[derive(Clone, Debug)]
pub struct AdapterSettings {
    pub login_timeout: Duration,
    pub poll_interval: Duration,
    pub page_timeout: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Config::default().adapter_settings()
    }
}

fn env_or<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value,
            expected_type: std::any::type_name::<T>().to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_submit_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(30), Duration::from_millis(350));
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("SMP_TEST_BAD_NUMBER", "abc");
        let result: Result<u32, _> = env_or("SMP_TEST_BAD_NUMBER", 1);
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarParseFailed { ref var_name, .. }) if var_name == "SMP_TEST_BAD_NUMBER"
        ));
        std::env::remove_var("SMP_TEST_BAD_NUMBER");
        assert_eq!(env_or("SMP_TEST_BAD_NUMBER", 7u32).unwrap(), 7);
    }

    #[test]
    fn test_derived_configs() {
        let config = Config {
            max_concurrent_accounts: 0,
            job_interval_ms: 10,
            ..Config::default()
        };
        let scheduler = config.scheduler();
        assert_eq!(scheduler.max_concurrent_accounts, 1);
        assert_eq!(scheduler.job_interval, Duration::from_millis(10));
        assert_eq!(scheduler.job_interval_jitter, Duration::from_millis(5000));
        assert_eq!(config.adapter_settings().login_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_next_interval_stays_within_jitter() {
        let mut scheduler = Config::default().scheduler();
        for _ in 0..50 {
            let wait = scheduler.next_interval();
            assert!(wait >= Duration::from_millis(3000));
            assert!(wait <= Duration::from_millis(8000));
        }

        scheduler.job_interval_jitter = Duration::ZERO;
        assert_eq!(scheduler.next_interval(), Duration::from_millis(3000));
    }
}
