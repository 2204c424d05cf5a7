use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

use self_media_publisher::adapters::{
    AdapterFactory, CoverChoice, LoginCheck, PlatformAdapter, PreparedContent, PublishReceipt,
};
use self_media_publisher::browser::connect_to_browser;
use self_media_publisher::config::{Config, RetryPolicy, SchedulerConfig};
use self_media_publisher::error::{AdapterError, ConfigError, ErrorKind, StorageError};
use self_media_publisher::logger;
use self_media_publisher::models::{Account, AccountId, Article, ArticleId, Platform, Session};
use self_media_publisher::orchestrator::{PublishLog, RunController, RunState};
use self_media_publisher::session::{FileSessionStore, MemorySessionStore, SessionStore};
use self_media_publisher::workflow::JobStatus;

/// 按脚本返回结果的平台适配器
#[derive(Default)]
struct FakeAdapter {
    logins: Mutex<VecDeque<Result<LoginCheck, AdapterError>>>,
    submits: Mutex<HashMap<String, VecDeque<Result<PublishReceipt, AdapterError>>>>,
    submit_delay: Duration,
    seen_sessions: Mutex<Vec<Option<Vec<u8>>>>,
    authentications: AtomicUsize,
    submit_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeAdapter {
    fn slow(delay: Duration) -> Self {
        Self {
            submit_delay: delay,
            ..Default::default()
        }
    }

    fn push_login(&self, result: Result<LoginCheck, AdapterError>) {
        self.logins.lock().unwrap().push_back(result);
    }

    fn push_submit(&self, title: &str, result: Result<PublishReceipt, AdapterError>) {
        self.submits
            .lock()
            .unwrap()
            .entry(title.to_string())
            .or_default()
            .push_back(result);
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        Platform::Toutiao
    }

    async fn check_login(&self, session: Option<&Session>) -> Result<LoginCheck, AdapterError> {
        self.seen_sessions
            .lock()
            .unwrap()
            .push(session.map(|s| s.payload().to_vec()));
        let scripted = self.logins.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(LoginCheck::accepted(None)))
    }

    async fn authenticate(&self) -> Result<Session, AdapterError> {
        let n = self.authentications.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session::new(format!("login-{}", n).into_bytes()))
    }

    async fn prepare(&self, article: &Article) -> Result<PreparedContent, AdapterError> {
        Ok(PreparedContent {
            title: article.title.clone(),
            body_text: article.body.clone(),
            body_html: format!("<p>{}</p>", article.body),
            cover: CoverChoice::Skip,
        })
    }

    async fn submit(&self, content: &PreparedContent) -> Result<PublishReceipt, AdapterError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.submit_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .submits
            .lock()
            .unwrap()
            .get_mut(&content.title)
            .and_then(|q| q.pop_front());
        scripted.unwrap_or_else(|| {
            Ok(PublishReceipt {
                platform_article_id: Some(format!("pid-{}", content.title)),
                url: None,
            })
        })
    }
}

#[derive(Default)]
struct FakeFactory {
    adapters: Mutex<HashMap<String, Arc<FakeAdapter>>>,
    broken: HashSet<String>,
    released: Mutex<Vec<String>>,
}

impl FakeFactory {
    fn adapter(&self, account: &str) -> Arc<FakeAdapter> {
        self.adapters
            .lock()
            .unwrap()
            .entry(account.to_string())
            .or_default()
            .clone()
    }

    fn install(&self, account: &str, adapter: FakeAdapter) -> Arc<FakeAdapter> {
        self.share(account, Arc::new(adapter))
    }

    /// 多个账号共用同一个适配器，便于统计跨账号的并发
    fn share(&self, account: &str, adapter: Arc<FakeAdapter>) -> Arc<FakeAdapter> {
        self.adapters
            .lock()
            .unwrap()
            .insert(account.to_string(), adapter.clone());
        adapter
    }
}

#[async_trait]
impl AdapterFactory for FakeFactory {
    async fn create(&self, account: &Account) -> Result<Arc<dyn PlatformAdapter>, AdapterError> {
        if self.broken.contains(account.id.as_str()) {
            return Err(AdapterError::TransientNetwork(
                "浏览器上下文创建失败".to_string(),
            ));
        }
        Ok(self.adapter(account.id.as_str()))
    }

    async fn release(&self, account: &Account) {
        self.released
            .lock()
            .unwrap()
            .push(account.id.as_str().to_string());
    }
}

/// 指定账号的登录状态无法读取
struct CorruptStore {
    inner: MemorySessionStore,
    broken: String,
}

#[async_trait]
impl SessionStore for CorruptStore {
    async fn load(&self, account_id: &AccountId) -> Result<Option<Session>, StorageError> {
        if account_id.as_str() == self.broken {
            return Err(StorageError::Corrupt {
                account_id: account_id.to_string(),
                reason: "登录状态文件损坏".to_string(),
            });
        }
        self.inner.load(account_id).await
    }

    async fn save(&self, account_id: &AccountId, session: &Session) -> Result<(), StorageError> {
        self.inner.save(account_id, session).await
    }

    async fn invalidate(&self, account_id: &AccountId) -> Result<(), StorageError> {
        self.inner.invalidate(account_id).await
    }
}

fn scheduler_config(max_submit_retries: u32) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_accounts: 2,
        retry: RetryPolicy {
            max_submit_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        job_interval: Duration::ZERO,
        job_interval_jitter: Duration::ZERO,
    }
}

fn account(id: &str, platform: Platform) -> Account {
    Account::new(AccountId::parse(id).unwrap(), platform, id, "")
}

fn articles(ids: &[&str]) -> Vec<Article> {
    ids.iter()
        .map(|id| Article::new(*id, *id, "这是一篇测试文章的正文"))
        .collect()
}

fn pair(account: &str, article: &str) -> (AccountId, ArticleId) {
    (AccountId::parse(account).unwrap(), ArticleId::new(article))
}

fn controller(
    config: SchedulerConfig,
    accounts: Vec<Account>,
    article_ids: &[&str],
    factory: Arc<FakeFactory>,
    store: Arc<dyn SessionStore>,
) -> RunController {
    RunController::new(
        config,
        accounts,
        articles(article_ids),
        factory,
        store,
        Arc::new(PublishLog::in_memory()),
    )
}

fn path_of(history: &[self_media_publisher::workflow::JobTransition]) -> Vec<JobStatus> {
    history.iter().map(|t| t.to).collect()
}

#[tokio::test]
async fn test_rejected_article_does_not_block_others() {
    let factory = Arc::new(FakeFactory::default());
    let toutiao = factory.adapter("a");
    toutiao.push_submit(
        "a2",
        Err(AdapterError::ContentRejected("标题含有敏感词".to_string())),
    );

    let controller = controller(
        scheduler_config(3),
        vec![account("a", Platform::Toutiao), account("b", Platform::Sohu)],
        &["a1", "a2", "b1"],
        factory.clone(),
        Arc::new(MemorySessionStore::new()),
    );
    let handle = controller
        .start(&[pair("a", "a1"), pair("a", "a2"), pair("b", "b1")])
        .unwrap();
    let status = handle.wait().await;

    assert_eq!(status.state, RunState::CompletedWithFailures);
    assert_eq!(status.counts.published, 2);
    assert_eq!(status.counts.failed, 1);

    assert_eq!(status.job("a", "a1").unwrap().status, JobStatus::Published);
    let rejected = status.job("a", "a2").unwrap();
    assert_eq!(rejected.status, JobStatus::Failed);
    assert_eq!(rejected.error_kind, Some(ErrorKind::ContentRejected));
    assert_eq!(rejected.attempts, 1);
    assert_eq!(toutiao.submit_calls.load(Ordering::SeqCst), 2);

    let published = status.job("b", "b1").unwrap();
    assert_eq!(published.platform_article_id.as_deref(), Some("pid-b1"));

    let mut released = factory.released.lock().unwrap().clone();
    released.sort();
    assert_eq!(released, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_transient_failures_stop_after_retry_budget() {
    let factory = Arc::new(FakeFactory::default());
    let adapter = factory.adapter("a");
    for _ in 0..3 {
        adapter.push_submit("a1", Err(AdapterError::TransientNetwork("超时".to_string())));
    }

    let controller = controller(
        scheduler_config(2),
        vec![account("a", Platform::Toutiao)],
        &["a1"],
        factory,
        Arc::new(MemorySessionStore::new()),
    );
    let status = controller.start(&[pair("a", "a1")]).unwrap().wait().await;

    let job = status.job("a", "a1").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::TransientNetwork));
    assert_eq!(job.attempts, 3);
    assert_eq!(adapter.submit_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_one_job_per_account_at_a_time() {
    let factory = Arc::new(FakeFactory::default());
    let a = factory.install("a", FakeAdapter::slow(Duration::from_millis(20)));
    let b = factory.install("b", FakeAdapter::slow(Duration::from_millis(20)));

    let controller = controller(
        scheduler_config(0),
        vec![account("a", Platform::Toutiao), account("b", Platform::Baijiahao)],
        &["a1", "a2", "a3", "b1", "b2", "b3"],
        factory,
        Arc::new(MemorySessionStore::new()),
    );
    let selection: Vec<_> = ["a1", "a2", "a3"]
        .iter()
        .map(|id| pair("a", id))
        .chain(["b1", "b2", "b3"].iter().map(|id| pair("b", id)))
        .collect();
    let status = controller.start(&selection).unwrap().wait().await;

    assert_eq!(status.state, RunState::Completed);
    assert_eq!(status.counts.published, 6);
    assert_eq!(a.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(b.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_login_refreshes_session_once() {
    let factory = Arc::new(FakeFactory::default());
    let adapter = factory.adapter("a");
    adapter.push_login(Ok(LoginCheck::rejected()));

    let store = Arc::new(MemorySessionStore::new());
    let controller = controller(
        scheduler_config(0),
        vec![account("a", Platform::Sohu)],
        &["a1", "a2"],
        factory,
        store.clone(),
    );
    let status = controller
        .start(&[pair("a", "a1"), pair("a", "a2")])
        .unwrap()
        .wait()
        .await;

    assert_eq!(status.counts.published, 2);
    assert_eq!(adapter.authentications.load(Ordering::SeqCst), 1);
    assert_eq!(
        *adapter.seen_sessions.lock().unwrap(),
        vec![None, Some(b"login-1".to_vec())]
    );
    assert_eq!(
        path_of(&status.job("a", "a1").unwrap().history),
        vec![
            JobStatus::LoggingIn,
            JobStatus::LoggingIn,
            JobStatus::Preparing,
            JobStatus::Submitting,
            JobStatus::Published,
        ]
    );

    let saved = assert_ok!(store.load(&AccountId::parse("a").unwrap()).await);
    assert_eq!(saved.unwrap().payload(), b"login-1");
}

#[tokio::test]
async fn test_second_auth_expiry_fails_job() {
    let factory = Arc::new(FakeFactory::default());
    let adapter = factory.adapter("a");
    for _ in 0..2 {
        adapter.push_submit("a1", Err(AdapterError::AuthExpired("登录已过期".to_string())));
    }

    let controller = controller(
        scheduler_config(3),
        vec![account("a", Platform::Toutiao)],
        &["a1"],
        factory,
        Arc::new(MemorySessionStore::new()),
    );
    let status = controller.start(&[pair("a", "a1")]).unwrap().wait().await;

    let job = status.job("a", "a1").unwrap();
    assert_eq!(job.error_kind, Some(ErrorKind::AuthExpired));
    assert_eq!(job.attempts, 2);
    assert_eq!(adapter.authentications.load(Ordering::SeqCst), 1);
    assert_eq!(
        path_of(&job.history),
        vec![
            JobStatus::LoggingIn,
            JobStatus::Preparing,
            JobStatus::Submitting,
            JobStatus::LoggingIn,
            JobStatus::Preparing,
            JobStatus::Submitting,
            JobStatus::Failed,
        ]
    );
}

#[tokio::test]
async fn test_stop_lets_inflight_submit_finish() {
    let factory = Arc::new(FakeFactory::default());
    factory.install("a", FakeAdapter::slow(Duration::from_millis(200)));

    let controller = controller(
        scheduler_config(0),
        vec![account("a", Platform::Toutiao)],
        &["a1", "a2"],
        factory,
        Arc::new(MemorySessionStore::new()),
    );
    let mut handle = controller
        .start(&[pair("a", "a1"), pair("a", "a2")])
        .unwrap();

    while let Some(event) = handle.next_event().await {
        if event.to == JobStatus::Submitting {
            assert!(controller.stop(handle.id()));
        }
    }

    let status = handle.wait().await;
    assert_eq!(status.state, RunState::Cancelled);
    assert_eq!(status.job("a", "a1").unwrap().status, JobStatus::Published);
    assert_eq!(status.job("a", "a2").unwrap().status, JobStatus::Cancelled);
    assert_eq!(status.job("a", "a2").unwrap().attempts, 0);
}

#[tokio::test]
async fn test_invalid_selections_create_no_jobs() {
    let factory = Arc::new(FakeFactory::default());
    let controller = controller(
        scheduler_config(0),
        vec![account("a", Platform::Toutiao)],
        &["a1"],
        factory.clone(),
        Arc::new(MemorySessionStore::new()),
    );

    assert_eq!(controller.start(&[]).err(), Some(ConfigError::EmptySelection));
    assert_eq!(
        controller.start(&[pair("ghost", "a1")]).err(),
        Some(ConfigError::UnknownAccount("ghost".to_string()))
    );
    assert!(matches!(
        controller.start(&[pair("a", "a1"), pair("a", "a1")]).err(),
        Some(ConfigError::DuplicateSelection { .. })
    ));
    assert!(factory.adapters.lock().unwrap().is_empty());
    assert!(controller.publish_log().entries().is_empty());
}

#[tokio::test]
async fn test_unreadable_session_skips_account() {
    let factory = Arc::new(FakeFactory::default());
    let store = Arc::new(CorruptStore {
        inner: MemorySessionStore::new(),
        broken: "bad".to_string(),
    });
    let controller = controller(
        scheduler_config(0),
        vec![account("bad", Platform::Sohu), account("ok", Platform::Sohu)],
        &["a1", "a2", "b1"],
        factory.clone(),
        store,
    );
    let status = controller
        .start(&[pair("bad", "a1"), pair("bad", "a2"), pair("ok", "b1")])
        .unwrap()
        .wait()
        .await;

    for article in ["a1", "a2"] {
        let job = status.job("bad", article).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_kind, Some(ErrorKind::Storage));
        assert_eq!(job.attempts, 0);
    }
    assert_eq!(status.job("ok", "b1").unwrap().status, JobStatus::Published);
    assert_eq!(factory.adapter("bad").submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_adapter_creation_failure_fails_account_jobs() {
    let factory = Arc::new(FakeFactory {
        broken: ["down".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let controller = controller(
        scheduler_config(0),
        vec![account("down", Platform::Baijiahao), account("up", Platform::Toutiao)],
        &["a1", "a2", "b1"],
        factory,
        Arc::new(MemorySessionStore::new()),
    );
    let status = controller
        .start(&[pair("down", "a1"), pair("down", "a2"), pair("up", "b1")])
        .unwrap()
        .wait()
        .await;

    assert_eq!(status.counts.failed, 2);
    assert_eq!(status.counts.published, 1);
    assert_eq!(
        status.job("down", "a2").unwrap().error_kind,
        Some(ErrorKind::TransientNetwork)
    );
}

#[tokio::test]
async fn test_publish_log_written_for_every_transition() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("publish_log.jsonl");
    let factory = Arc::new(FakeFactory::default());
    let controller = RunController::new(
        scheduler_config(0),
        vec![account("a", Platform::Toutiao)],
        articles(&["a1"]),
        factory,
        Arc::new(MemorySessionStore::new()),
        Arc::new(PublishLog::with_path(&path)),
    );

    let mut handle = controller.start(&[pair("a", "a1")]).unwrap();
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    controller.publish_log().flush().await;

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), events.len());
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3]["to"], "published");
    assert_eq!(lines[3]["platform_article_id"], "pid-a1");
    assert_eq!(controller.publish_log().entries().len(), 4);
}

#[tokio::test]
async fn test_unconfirmed_publish_is_never_resubmitted() {
    let factory = Arc::new(FakeFactory::default());
    let adapter = factory.adapter("a");
    adapter.push_submit(
        "a1",
        Err(AdapterError::Unconfirmed("发布结果确认超时".to_string())),
    );

    let controller = controller(
        scheduler_config(3),
        vec![account("a", Platform::Baijiahao)],
        &["a1"],
        factory,
        Arc::new(MemorySessionStore::new()),
    );
    let status = controller.start(&[pair("a", "a1")]).unwrap().wait().await;

    let job = status.job("a", "a1").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::Unconfirmed));
    assert_eq!(job.attempts, 1);
    assert_eq!(adapter.submit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrency_limit_is_shared_between_runs() {
    let factory = Arc::new(FakeFactory::default());
    let shared = factory.install("a", FakeAdapter::slow(Duration::from_millis(30)));
    factory.share("b", shared.clone());

    let mut config = scheduler_config(0);
    config.max_concurrent_accounts = 1;
    let controller = controller(
        config,
        vec![account("a", Platform::Toutiao), account("b", Platform::Sohu)],
        &["a1", "b1"],
        factory,
        Arc::new(MemorySessionStore::new()),
    );
    let first = controller.start(&[pair("a", "a1")]).unwrap();
    let second = controller.start(&[pair("b", "b1")]).unwrap();

    assert_eq!(first.wait().await.state, RunState::Completed);
    assert_eq!(second.wait().await.state, RunState::Completed);
    assert_eq!(shared.submit_calls.load(Ordering::SeqCst), 2);
    assert_eq!(shared.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_damaged_session_file_leads_to_fresh_login() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.session"), b"not a session").unwrap();
    let store = Arc::new(FileSessionStore::new(dir.path()));

    let factory = Arc::new(FakeFactory::default());
    let adapter = factory.adapter("a");
    adapter.push_login(Ok(LoginCheck::rejected()));

    let controller = controller(
        scheduler_config(0),
        vec![account("a", Platform::Toutiao)],
        &["a1"],
        factory,
        store.clone(),
    );
    let status = controller.start(&[pair("a", "a1")]).unwrap().wait().await;

    assert_eq!(status.job("a", "a1").unwrap().status, JobStatus::Published);
    assert_eq!(*adapter.seen_sessions.lock().unwrap(), vec![None]);
    assert_eq!(adapter.authentications.load(Ordering::SeqCst), 1);
    let saved = assert_ok!(store.load(&AccountId::parse("a").unwrap()).await);
    assert_eq!(saved.unwrap().payload(), b"login-1");
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_browser_connection() {
    // 初始化日志
    logger::init(true);

    // 加载配置
    let config = Config::from_env().expect("读取配置失败");

    // 测试浏览器连接（需以 --remote-debugging-port 启动浏览器）
    let result = connect_to_browser(config.browser_debug_port).await;

    assert!(result.is_ok(), "应该能够成功连接浏览器");
}
