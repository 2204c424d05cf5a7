use chrono::{DateTime, Utc};

/// 登录状态
///
/// 浏览器认证状态的序列化快照（Cookie、localStorage 等）。
/// 内容格式由驱动决定，核心流程只把它当作字节。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    payload: Vec<u8>,
    captured_at: DateTime<Utc>,
}

impl Session {
    /// 以当前时间创建
    pub fn new(payload: Vec<u8>) -> Self {
        Self::captured(payload, Utc::now())
    }

    pub fn captured(payload: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            captured_at,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}
