use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use coordinator_core::{CoordinatorError, CoordinatorResult};

static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// 实例标识，格式为 `{prefix}-{hostname}-{tick}`
///
/// `tick` 是创建时刻的纳秒计数，在同一进程内严格递增，选主时数值最小者优先。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId {
    value: String,
    tick: u64,
}

impl InstanceId {
    /// 为当前进程生成新的实例标识
    pub fn generate(prefix: &str) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self::with_tick(prefix, &host, next_tick())
    }

    pub fn with_tick(prefix: &str, host: &str, tick: u64) -> Self {
        Self {
            value: format!("{prefix}-{host}-{tick}"),
            tick,
        }
    }

    /// 解析已有标识，末段必须是数字
    pub fn parse(value: &str) -> CoordinatorResult<Self> {
        let tick = creation_tick(value)
            .ok_or_else(|| CoordinatorError::InvalidInstanceId(value.to_string()))?;
        Ok(Self {
            value: value.to_string(),
            tick,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn creation_tick(&self) -> u64 {
        self.tick
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

/// 提取实例标识末尾的创建刻度
pub fn creation_tick(instance_id: &str) -> Option<u64> {
    let (_, suffix) = instance_id.rsplit_once('-')?;
    suffix.parse().ok()
}

fn next_tick() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    let mut last = LAST_TICK.load(Ordering::SeqCst);
    loop {
        let candidate = now.max(last + 1);
        match LAST_TICK.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_strictly_increasing() {
        let a = InstanceId::generate("coordinator");
        let b = InstanceId::generate("coordinator");
        assert!(a.creation_tick() < b.creation_tick());
        assert!(a.as_str().starts_with("coordinator-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_round_trips_generated_id() {
        let id = InstanceId::generate("worker");
        let parsed = InstanceId::parse(id.as_str()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_hostname_with_dashes() {
        let id = InstanceId::with_tick("coordinator", "web-01-eu", 42);
        assert_eq!(id.as_str(), "coordinator-web-01-eu-42");
        assert_eq!(creation_tick(id.as_str()), Some(42));
    }

    #[test]
    fn test_parse_rejects_missing_tick() {
        assert!(matches!(
            InstanceId::parse("coordinator-host"),
            Err(CoordinatorError::InvalidInstanceId(_))
        ));
        assert!(InstanceId::parse("plain").is_err());
        assert_eq!(creation_tick("a-b-"), None);
    }
}
