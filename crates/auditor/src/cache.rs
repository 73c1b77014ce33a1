//! 갱신 캐시 -- 파일 키별 감사 결과와 staleness 정책
//!
//! [`RefreshCache`]는 키마다 (값, 마지막 갱신 시각, 갱신 중 여부)를 보관합니다.
//! 세션 맵을 먼저 보고, 없으면 [`PropertyStore`]에서 읽어 세션 맵에 올립니다.
//!
//! # 상태 전이
//!
//! ```text
//! Unknown ──lookup──▶ Refreshing ──complete──▶ Fresh ──(window 경과)──▶ Stale
//!                          ▲  └──────fail──────▶ Stale (timestamp 유지)     │
//!                          └──────────────────────lookup───────────────────┘
//! ```
//!
//! `lookup`은 갱신이 필요하면 그 자리에서 `refreshing`을 세워 갱신을 "선점"합니다.
//! 같은 키에 대해 선점은 한 번만 성공하므로 중복 enqueue가 생기지 않습니다.
//! 선점한 호출자는 반드시 `complete` 또는 `fail`로 갱신을 끝내야 합니다.
//!
//! # 영속 형식
//!
//! namespace `audit:<key>` 아래에 두 속성을 기록합니다.
//!
//! - `audit`: 값의 JSON, 또는 값이 없으면 `"-1"`
//! - `timestamp`: epoch millis 문자열 (파싱 불가 시 stale로 취급)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use depwatch_core::metrics as m;

use crate::error::AuditorError;
use crate::store::PropertyStore;

/// 영속 계층 namespace 접두어
pub const AUDIT_NAMESPACE_PREFIX: &str = "audit:";

/// "해석 결과 없음" 표식
const NO_VALUE_SENTINEL: &str = "-1";

/// 현재 시각 제공자
pub trait Clock: Send + Sync {
    /// epoch millis
    fn now_ms(&self) -> u64;
}

/// 시스템 시계
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// 수동으로 조작하는 시계 (테스트, 재현용)
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// 키의 캐시 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// 캐시된 결과 없음
    Unknown,
    /// staleness window 이내
    Fresh,
    /// staleness window 초과
    Stale,
    /// 갱신 진행 중
    Refreshing,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Fresh => write!(f, "fresh"),
            Self::Stale => write!(f, "stale"),
            Self::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// 캐시 엔트리 스냅샷
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: Option<V>,
    /// 마지막 갱신 시각 (epoch millis)
    pub last_updated_at: u64,
    pub refreshing: bool,
}

/// 조회 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<V> {
    /// 마지막으로 알려진 값
    pub value: Option<V>,
    /// 조회 시점의 상태 (선점 전)
    pub state: CacheState,
    /// 호출자가 갱신을 enqueue해야 하는지 여부
    pub refresh_needed: bool,
}

#[derive(Debug, Clone)]
struct Stamped<V> {
    value: Option<V>,
    last_updated_at: u64,
}

#[derive(Debug)]
struct Slot<V> {
    entry: Option<Stamped<V>>,
    refreshing: bool,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            entry: None,
            refreshing: false,
        }
    }
}

/// staleness window를 가진 키-값 캐시
pub struct RefreshCache<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
    store: Option<Arc<dyn PropertyStore>>,
    clock: Arc<dyn Clock>,
    window_ms: u64,
}

impl<V> RefreshCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send,
{
    /// 새 캐시를 생성합니다.
    ///
    /// `store`가 `None`이면 세션 메모리에만 보관합니다.
    pub fn new(window: Duration, clock: Arc<dyn Clock>, store: Option<Arc<dyn PropertyStore>>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            store,
            clock,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Slot<V>>>, AuditorError> {
        self.slots
            .lock()
            .map_err(|e| AuditorError::Store(format!("cache lock poisoned: {e}")))
    }

    fn state_of(&self, slot: &Slot<V>, now: u64) -> CacheState {
        if slot.refreshing {
            return CacheState::Refreshing;
        }
        match slot.entry {
            None => CacheState::Unknown,
            Some(ref e) if now.saturating_sub(e.last_updated_at) <= self.window_ms => {
                CacheState::Fresh
            }
            Some(_) => CacheState::Stale,
        }
    }

    /// 세션 맵에 슬롯이 없으면 영속 계층에서 읽어 채웁니다.
    fn ensure_loaded<'a>(&self, slots: &'a mut HashMap<String, Slot<V>>, key: &str) -> &'a mut Slot<V> {
        if !slots.contains_key(key) {
            let entry = self.load_persisted(key);
            slots.insert(
                key.to_owned(),
                Slot {
                    entry,
                    refreshing: false,
                },
            );
        }
        slots.entry(key.to_owned()).or_default()
    }

    fn load_persisted(&self, key: &str) -> Option<Stamped<V>> {
        let store = self.store.as_ref()?;
        let ns = format!("{AUDIT_NAMESPACE_PREFIX}{key}");
        let read = |name: &str| match store.get(&ns, name) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted cache entry");
                None
            }
        };
        let audit = read("audit");
        let timestamp = read("timestamp");
        if audit.is_none() && timestamp.is_none() {
            return None;
        }

        // 파싱할 수 없는 timestamp는 0으로 두어 stale로 만듭니다
        let last_updated_at = timestamp.and_then(|t| t.parse::<u64>().ok()).unwrap_or(0);
        let value = match audit.as_deref() {
            None | Some(NO_VALUE_SENTINEL) => None,
            Some(json) => match serde_json::from_str(json) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(key, error = %e, "discarding unparsable persisted cache value");
                    return Some(Stamped {
                        value: None,
                        last_updated_at: 0,
                    });
                }
            },
        };
        debug!(key, last_updated_at, "loaded cache entry from store");
        Some(Stamped {
            value,
            last_updated_at,
        })
    }

    fn persist(&self, key: &str, entry: &Stamped<V>) -> Result<(), AuditorError> {
        let Some(ref store) = self.store else {
            return Ok(());
        };
        let ns = format!("{AUDIT_NAMESPACE_PREFIX}{key}");
        let audit = match entry.value {
            Some(ref v) => serde_json::to_string(v)
                .map_err(|e| AuditorError::Store(format!("failed to serialize cache value: {e}")))?,
            None => NO_VALUE_SENTINEL.to_owned(),
        };
        store.set(&ns, "audit", &audit)?;
        store.set(&ns, "timestamp", &entry.last_updated_at.to_string())
    }

    /// 상태를 바꾸지 않고 조회합니다.
    pub fn peek(&self, key: &str) -> Result<Lookup<V>, AuditorError> {
        let now = self.clock.now_ms();
        let mut slots = self.lock()?;
        let slot = self.ensure_loaded(&mut slots, key);
        let state = self.state_of(slot, now);
        Ok(Lookup {
            value: slot.entry.as_ref().and_then(|e| e.value.clone()),
            state,
            refresh_needed: matches!(state, CacheState::Unknown | CacheState::Stale),
        })
    }

    /// 조회하고, 갱신이 필요하면 갱신을 선점합니다.
    ///
    /// `refresh_needed == true`를 받은 호출자만 갱신을 enqueue해야 합니다.
    pub fn lookup(&self, key: &str) -> Result<Lookup<V>, AuditorError> {
        let now = self.clock.now_ms();
        let mut slots = self.lock()?;
        let slot = self.ensure_loaded(&mut slots, key);
        let state = self.state_of(slot, now);
        let refresh_needed = matches!(state, CacheState::Unknown | CacheState::Stale);
        if refresh_needed {
            slot.refreshing = true;
        }
        match state {
            CacheState::Fresh => metrics::counter!(m::CACHE_HITS_TOTAL).increment(1),
            _ => metrics::counter!(m::CACHE_MISSES_TOTAL).increment(1),
        }
        Ok(Lookup {
            value: slot.entry.as_ref().and_then(|e| e.value.clone()),
            state,
            refresh_needed,
        })
    }

    /// 상태와 관계없이 갱신을 선점합니다. 이미 갱신 중이면 `false`.
    pub fn begin_refresh(&self, key: &str) -> Result<bool, AuditorError> {
        let mut slots = self.lock()?;
        let slot = self.ensure_loaded(&mut slots, key);
        if slot.refreshing {
            return Ok(false);
        }
        slot.refreshing = true;
        Ok(true)
    }

    /// 갱신 성공: 값을 바꾸고 timestamp를 현재 시각으로 올립니다 (감소하지 않음).
    ///
    /// 세션 맵은 항상 갱신되며, 영속 계층 기록 실패만 에러로 반환합니다.
    pub fn complete(&self, key: &str, value: Option<V>) -> Result<(), AuditorError> {
        let now = self.clock.now_ms();
        let stamped = {
            let mut slots = self.lock()?;
            let slot = self.ensure_loaded(&mut slots, key);
            let previous = slot.entry.as_ref().map_or(0, |e| e.last_updated_at);
            let stamped = Stamped {
                value,
                last_updated_at: now.max(previous),
            };
            slot.entry = Some(stamped.clone());
            slot.refreshing = false;
            stamped
        };
        self.persist(key, &stamped)
    }

    /// 원격 없이 얻은 값: 값만 바꾸고 timestamp는 그대로 둡니다.
    ///
    /// 처음 보는 키는 갱신 창 바로 밖의 timestamp로 기록되어 다음 조회에서 stale이 됩니다.
    pub fn store_offline(&self, key: &str, value: V) -> Result<(), AuditorError> {
        let expired = self
            .clock
            .now_ms()
            .saturating_sub(self.window_ms.saturating_add(1));
        let stamped = {
            let mut slots = self.lock()?;
            let slot = self.ensure_loaded(&mut slots, key);
            let last_updated_at = slot.entry.as_ref().map_or(expired, |e| e.last_updated_at);
            let stamped = Stamped {
                value: Some(value),
                last_updated_at,
            };
            slot.entry = Some(stamped.clone());
            slot.refreshing = false;
            stamped
        };
        self.persist(key, &stamped)
    }

    /// 갱신 실패: 갱신 중 표시만 해제하고 값과 timestamp는 그대로 둡니다.
    pub fn fail(&self, key: &str) -> Result<(), AuditorError> {
        let mut slots = self.lock()?;
        if let Some(slot) = slots.get_mut(key) {
            slot.refreshing = false;
        }
        Ok(())
    }

    /// 엔트리 스냅샷 (없으면 `None`)
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry<V>>, AuditorError> {
        let mut slots = self.lock()?;
        let slot = self.ensure_loaded(&mut slots, key);
        Ok(slot.entry.as_ref().map(|e| CacheEntry {
            value: e.value.clone(),
            last_updated_at: e.last_updated_at,
            refreshing: slot.refreshing,
        }))
    }

    /// 세션 맵과 영속 계층에 알려진 모든 키 (정렬됨)
    pub fn keys(&self) -> Result<Vec<String>, AuditorError> {
        let mut keys: Vec<String> = self.lock()?.iter()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(k, _)| k.clone())
            .collect();
        if let Some(ref store) = self.store {
            keys.extend(
                store
                    .namespaces()?
                    .into_iter()
                    .filter_map(|ns| ns.strip_prefix(AUDIT_NAMESPACE_PREFIX).map(str::to_owned)),
            );
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const HOUR_MS: u64 = 60 * 60 * 1000;
    const T0: u64 = 1_700_000_000_000;

    fn cache_with(clock: Arc<ManualClock>, store: Option<Arc<dyn PropertyStore>>) -> RefreshCache<String> {
        RefreshCache::new(Duration::from_secs(12 * 3600), clock, store)
    }

    #[test]
    fn unknown_lookup_claims_refresh_once() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(clock, None);

        let first = cache.lookup("a").unwrap();
        assert_eq!(first.state, CacheState::Unknown);
        assert!(first.refresh_needed);

        let second = cache.lookup("a").unwrap();
        assert_eq!(second.state, CacheState::Refreshing);
        assert!(!second.refresh_needed);
        assert_eq!(second.value, None);
    }

    #[test]
    fn fresh_reads_return_same_value_without_refresh() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(Arc::clone(&clock), None);
        cache.complete("a", Some("v1".to_owned())).unwrap();

        clock.advance(Duration::from_secs(3600));
        let one = cache.lookup("a").unwrap();
        let two = cache.lookup("a").unwrap();
        assert_eq!(one, two);
        assert_eq!(one.state, CacheState::Fresh);
        assert!(!one.refresh_needed);
        assert_eq!(one.value.as_deref(), Some("v1"));
    }

    #[test]
    fn stale_entry_returns_value_and_claims_refresh() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(Arc::clone(&clock), None);
        cache.complete("a", Some("old".to_owned())).unwrap();
        clock.set(T0 + 13 * HOUR_MS);

        let read = cache.lookup("a").unwrap();
        assert_eq!(read.state, CacheState::Stale);
        assert!(read.refresh_needed);
        assert_eq!(read.value.as_deref(), Some("old"));

        let again = cache.lookup("a").unwrap();
        assert_eq!(again.state, CacheState::Refreshing);
        assert!(!again.refresh_needed);
        assert_eq!(again.value.as_deref(), Some("old"));
    }

    #[test]
    fn window_boundary_is_fresh() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(Arc::clone(&clock), None);
        cache.complete("a", None).unwrap();
        clock.set(T0 + 12 * HOUR_MS);
        assert_eq!(cache.peek("a").unwrap().state, CacheState::Fresh);
        clock.set(T0 + 12 * HOUR_MS + 1);
        assert_eq!(cache.peek("a").unwrap().state, CacheState::Stale);
    }

    #[test]
    fn fail_keeps_timestamp_and_allows_retry() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(Arc::clone(&clock), None);
        cache.complete("a", Some("old".to_owned())).unwrap();
        clock.set(T0 + 13 * HOUR_MS);

        assert!(cache.lookup("a").unwrap().refresh_needed);
        cache.fail("a").unwrap();

        let entry = cache.entry("a").unwrap().unwrap();
        assert_eq!(entry.last_updated_at, T0);
        assert!(!entry.refreshing);
        assert!(cache.lookup("a").unwrap().refresh_needed);
    }

    #[test]
    fn offline_value_never_refreshes_timestamp() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(Arc::clone(&clock), None);
        cache.complete("a", Some("old".to_owned())).unwrap();
        clock.set(T0 + 13 * HOUR_MS);
        assert!(cache.begin_refresh("a").unwrap());

        cache.store_offline("a", "stored".to_owned()).unwrap();
        let entry = cache.entry("a").unwrap().unwrap();
        assert_eq!(entry.last_updated_at, T0);
        assert_eq!(entry.value.as_deref(), Some("stored"));
        assert!(!entry.refreshing);

        cache.store_offline("b", "stored".to_owned()).unwrap();
        let first_seen = cache.peek("b").unwrap();
        assert_eq!(first_seen.state, CacheState::Stale);
        assert_eq!(first_seen.value.as_deref(), Some("stored"));
    }

    #[test]
    fn timestamps_never_decrease() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(Arc::clone(&clock), None);
        cache.complete("a", Some("v1".to_owned())).unwrap();
        clock.set(T0 - 5000);
        cache.complete("a", Some("v2".to_owned())).unwrap();
        let entry = cache.entry("a").unwrap().unwrap();
        assert_eq!(entry.last_updated_at, T0);
        assert_eq!(entry.value.as_deref(), Some("v2"));
    }

    #[test]
    fn begin_refresh_is_exclusive() {
        let cache = cache_with(Arc::new(ManualClock::new(T0)), None);
        assert!(cache.begin_refresh("a").unwrap());
        assert!(!cache.begin_refresh("a").unwrap());
        cache.complete("a", None).unwrap();
        assert!(cache.begin_refresh("a").unwrap());
    }

    #[test]
    fn persists_and_reloads_through_store() {
        let store: Arc<dyn PropertyStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache_with(Arc::clone(&clock), Some(Arc::clone(&store)));
        cache.complete("pkg", Some("v".to_owned())).unwrap();
        cache.complete("none", None).unwrap();

        assert_eq!(
            store.get("audit:none", "audit").unwrap().as_deref(),
            Some("-1")
        );
        assert_eq!(
            store.get("audit:pkg", "timestamp").unwrap(),
            Some(T0.to_string())
        );

        let reloaded = cache_with(clock, Some(store));
        let read = reloaded.lookup("pkg").unwrap();
        assert_eq!(read.state, CacheState::Fresh);
        assert_eq!(read.value.as_deref(), Some("v"));
        assert_eq!(reloaded.keys().unwrap(), vec!["none", "pkg"]);
    }

    #[test]
    fn unparsable_timestamp_counts_as_stale() {
        let store: Arc<dyn PropertyStore> = Arc::new(MemoryStore::new());
        store.set("audit:pkg", "audit", "\"v\"").unwrap();
        store.set("audit:pkg", "timestamp", "yesterday").unwrap();

        let cache = cache_with(Arc::new(ManualClock::new(T0)), Some(store));
        let read = cache.lookup("pkg").unwrap();
        assert_eq!(read.state, CacheState::Stale);
        assert_eq!(read.value.as_deref(), Some("v"));
        assert!(read.refresh_needed);
    }
}
