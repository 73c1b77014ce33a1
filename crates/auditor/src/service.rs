//! 감사 서비스 -- 파이프라인, 캐시, 스케줄러, 저장소를 조립한 진입점
//!
//! [`AuditService`]는 전역 싱글톤이 아니라 호스트가 [`AuditServiceBuilder`]로
//! 명시적으로 생성하고 core의 [`Plugin`] 생명주기로 관리합니다.
//!
//! # 조회 경로
//!
//! ```text
//! get_non_blocking(path) ─┬─ breaker open ─→ Offline(캐시 값) / Unavailable
//!                         └─ RefreshCache::lookup ─┬─ Fresh / Refreshing → 캐시 값
//!                                                  └─ Unknown / Stale → enqueue
//!                                                         │
//!                      ResolutionScheduler ─ CacheRefreshRunner ─ AuditPipeline
//!                                                         │
//!                                       RefreshCache::complete / fail
//! ```
//!
//! `get_non_blocking`은 네트워크를 기다리지 않습니다. `get_blocking`은 캐시 항목이
//! 전혀 없을 때만 인라인으로 해석합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use depwatch_core::error::DepwatchError;
use depwatch_core::plugin::{HealthStatus, Plugin, PluginInfo, PluginState};

use crate::cache::{CacheState, Clock, RefreshCache, SystemClock};
use crate::config::AuditorConfig;
use crate::emitter::{ChannelListener, FindingEmitter, FindingListener};
use crate::error::AuditorError;
use crate::event::FindingEvent;
use crate::index::{HttpIndexClient, VulnerabilityIndex};
use crate::manifest::{CoordinateResolver, ReaderRegistry, discover_manifests};
use crate::pipeline::AuditPipeline;
use crate::scheduler::{BatchRunner, EnqueueOutcome, ResolutionScheduler, SchedulerEvent};
use crate::store::{JsonFileStore, PropertyStore, ResponseCache};
use crate::types::{FileAudit, FindingSeverity};

/// 서비스 수준 감사 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// staleness window 이내의 결과
    Fresh,
    /// 오래된 결과 (갱신 요청됨)
    Stale,
    /// 갱신 진행 중 (마지막 결과)
    Refreshing,
    /// 브레이커가 열렸고 캐시된 결과가 있음
    Offline,
    /// 브레이커가 열렸고 캐시된 결과가 없음
    Unavailable,
    /// 아직 결과 없음 (해석 요청됨)
    Unknown,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Stale => write!(f, "stale"),
            Self::Refreshing => write!(f, "refreshing"),
            Self::Offline => write!(f, "offline"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<CacheState> for AuditStatus {
    fn from(state: CacheState) -> Self {
        match state {
            CacheState::Unknown => Self::Unknown,
            CacheState::Fresh => Self::Fresh,
            CacheState::Stale => Self::Stale,
            CacheState::Refreshing => Self::Refreshing,
        }
    }
}

/// 조회 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditView {
    pub audit: Option<FileAudit>,
    pub status: AuditStatus,
}

/// `cache show`용 요약 행
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSummary {
    pub key: String,
    pub state: CacheState,
    /// 마지막 갱신 시각 (epoch millis)
    pub last_updated_at: u64,
    pub dependencies: usize,
    pub vulnerabilities: usize,
    pub severity: FindingSeverity,
}

/// 스케줄러 배치에서 파일 하나를 해석하고 캐시에 반영합니다.
struct CacheRefreshRunner {
    pipeline: Arc<AuditPipeline>,
    cache: Arc<RefreshCache<FileAudit>>,
    audits_completed: Arc<AtomicU64>,
    endpoint: String,
}

#[async_trait]
impl BatchRunner for CacheRefreshRunner {
    async fn run_one(&self, key: &str) -> Result<(), AuditorError> {
        match self.pipeline.audit_file(Path::new(key)).await {
            // 저장된 응답으로 만든 결과는 보관하되 fresh로 만들지 않고 연결 실패로 보고
            Ok(audit) if audit.served_offline => {
                self.cache.store_offline(key, audit)?;
                Err(AuditorError::connectivity(
                    &self.endpoint,
                    "index unreachable, audit built from stored responses",
                ))
            }
            Ok(audit) => {
                self.cache.complete(key, Some(audit))?;
                self.audits_completed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            // 파일 자체를 읽거나 해석할 수 없으면 "결과 없음"으로 기록
            Err(e @ (AuditorError::ManifestParse { .. }
            | AuditorError::FileTooBig { .. }
            | AuditorError::Io { .. })) => {
                self.cache.complete(key, None)?;
                Err(e)
            }
            Err(e) => {
                self.cache.fail(key)?;
                Err(e)
            }
        }
    }

    fn abandoned(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.cache.fail(key) {
                warn!(key = %key, error = %e, "failed to release abandoned cache entry");
            }
        }
    }
}

/// 의존성 감사 서비스
pub struct AuditService {
    info: PluginInfo,
    state: PluginState,
    config: AuditorConfig,
    registry: Arc<ReaderRegistry>,
    emitter: Arc<FindingEmitter>,
    cache: Arc<RefreshCache<FileAudit>>,
    scheduler: ResolutionScheduler,
    runner: Arc<CacheRefreshRunner>,
    audits_completed: Arc<AtomicU64>,
}

impl AuditService {
    pub fn config(&self) -> &AuditorConfig {
        &self.config
    }

    /// 리스너를 추가로 연결할 수 있는 발행기
    pub fn emitter(&self) -> &Arc<FindingEmitter> {
        &self.emitter
    }

    pub fn scheduler(&self) -> &ResolutionScheduler {
        &self.scheduler
    }

    /// 완료된 파일 감사 수
    pub fn audits_completed(&self) -> u64 {
        self.audits_completed.load(Ordering::Relaxed)
    }

    pub fn is_offline(&self) -> bool {
        self.scheduler.is_circuit_open()
    }

    fn key_of(path: &Path) -> String {
        path.display().to_string()
    }

    fn offline_view(&self, key: &str) -> Result<AuditView, AuditorError> {
        let audit = self.cache.peek(key)?.value;
        let status = if audit.is_some() {
            AuditStatus::Offline
        } else {
            AuditStatus::Unavailable
        };
        Ok(AuditView { audit, status })
    }

    /// 캐시된 결과를 즉시 반환하고, 필요하면 백그라운드 갱신을 요청합니다.
    ///
    /// 네트워크를 기다리지 않습니다.
    pub fn get_non_blocking(&self, path: &Path) -> Result<AuditView, AuditorError> {
        let key = Self::key_of(path);
        if self.scheduler.is_circuit_open() {
            return self.offline_view(&key);
        }

        let lookup = self.cache.lookup(&key)?;
        if lookup.refresh_needed {
            if let Err(e) = self.scheduler.enqueue(&key) {
                self.cache.fail(&key)?;
                if e.is_connectivity() {
                    return self.offline_view(&key);
                }
                return Err(e);
            }
        }
        Ok(AuditView {
            audit: lookup.value,
            status: lookup.state.into(),
        })
    }

    /// 캐시 항목이 없을 때만 인라인으로 해석하고, 그 외에는 `get_non_blocking`과 같습니다.
    pub async fn get_blocking(&self, path: &Path) -> Result<AuditView, AuditorError> {
        let key = Self::key_of(path);
        if self.scheduler.is_circuit_open() {
            return self.offline_view(&key);
        }
        let peeked = self.cache.peek(&key)?;
        if peeked.state != CacheState::Unknown || !self.cache.begin_refresh(&key)? {
            return self.get_non_blocking(path);
        }

        debug!(key = %key, "no cached audit, resolving inline");
        match self.runner.run_one(&key).await {
            Ok(()) => Ok(AuditView {
                audit: self.cache.peek(&key)?.value,
                status: AuditStatus::Fresh,
            }),
            Err(e) if e.is_connectivity() => {
                self.scheduler.trip(&e.to_string());
                self.offline_view(&key)
            }
            Err(e) => Err(e),
        }
    }

    /// 캐시 상태와 관계없이 즉시 인라인으로 다시 감사합니다.
    ///
    /// 브레이커가 열려 있으면 원격 호출 없이 `AuditorError::Connectivity`를 반환합니다.
    /// 같은 키의 갱신이 이미 진행 중이면 새로 해석하지 않고 그 결과를 기다립니다.
    pub async fn audit_now(&self, path: &Path) -> Result<FileAudit, AuditorError> {
        let key = Self::key_of(path);
        if self.scheduler.is_circuit_open() {
            return Err(self.circuit_open_error());
        }
        if !self.cache.begin_refresh(&key)? {
            debug!(key = %key, "refresh already in flight, waiting for it");
            self.scheduler.wait_idle().await;
            if self.scheduler.is_circuit_open() {
                return Err(self.circuit_open_error());
            }
            let peeked = self.cache.peek(&key)?;
            return match peeked.value {
                Some(audit) if peeked.state == CacheState::Fresh => Ok(audit),
                _ => Err(AuditorError::Index(format!(
                    "refresh of {key} is still in progress or failed"
                ))),
            };
        }
        let result = self.runner.run_one(&key).await;
        if let Err(ref e) = result
            && e.is_connectivity()
        {
            self.scheduler.trip(&e.to_string());
        }
        result?;
        self.cache
            .peek(&key)?
            .value
            .ok_or_else(|| AuditorError::Store(format!("audit for {key} missing after refresh")))
    }

    fn circuit_open_error(&self) -> AuditorError {
        AuditorError::connectivity(
            &self.config.index_url,
            "circuit open, remote calls suspended until reset",
        )
    }

    /// 상태와 관계없이 백그라운드 갱신을 요청합니다.
    pub fn refresh(&self, path: &Path) -> Result<EnqueueOutcome, AuditorError> {
        let key = Self::key_of(path);
        if !self.cache.begin_refresh(&key)? {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }
        self.scheduler.enqueue(&key).inspect_err(|_| {
            if let Err(e) = self.cache.fail(&key) {
                warn!(key = %key, error = %e, "failed to release cache entry");
            }
        })
    }

    /// 프로젝트 트리에서 감사할 매니페스트를 찾습니다.
    pub async fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, AuditorError> {
        let root = root.to_path_buf();
        let registry = Arc::clone(&self.registry);
        let ignore_dirs = self.config.ignore_dirs.clone();
        tokio::task::spawn_blocking(move || discover_manifests(&root, &registry, &ignore_dirs))
            .await
            .map_err(|e| AuditorError::Channel(format!("spawn_blocking failed: {e}")))?
    }

    /// 브레이커를 닫고 백그라운드 해석을 다시 허용합니다.
    pub fn reset_circuit(&self) {
        self.scheduler.reset_circuit();
    }

    /// 대기 중인 백그라운드 해석이 모두 끝날 때까지 기다립니다.
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SchedulerEvent> {
        self.scheduler.subscribe()
    }

    /// 알려진 모든 캐시 항목의 요약
    pub fn cache_entries(&self) -> Result<Vec<CacheSummary>, AuditorError> {
        let mut rows = Vec::new();
        for key in self.cache.keys()? {
            let Some(entry) = self.cache.entry(&key)? else {
                continue;
            };
            let state = self.cache.peek(&key)?.state;
            let (dependencies, vulnerabilities, severity) = entry
                .value
                .as_ref()
                .map_or((0, 0, FindingSeverity::None), |a| {
                    (a.dependency_count(), a.vulnerability_count(), a.severity())
                });
            rows.push(CacheSummary {
                key,
                state,
                last_updated_at: entry.last_updated_at,
                dependencies,
                vulnerabilities,
                severity,
            });
        }
        Ok(rows)
    }
}

impl Plugin for AuditService {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn state(&self) -> PluginState {
        self.state
    }

    async fn init(&mut self) -> Result<(), DepwatchError> {
        self.state
            .ensure(&self.info.name, "init", &[PluginState::Created])?;
        self.state = PluginState::Initialized;
        info!(
            index = %self.config.index_url,
            staleness_hours = self.config.staleness_hours,
            persist = self.config.persist,
            "audit service initialized"
        );
        Ok(())
    }

    async fn start(&mut self) -> Result<(), DepwatchError> {
        self.state.ensure(
            &self.info.name,
            "start",
            &[PluginState::Initialized, PluginState::Stopped],
        )?;
        self.scheduler.resume();
        self.state = PluginState::Running;
        info!("audit service started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DepwatchError> {
        self.state
            .ensure(&self.info.name, "stop", &[PluginState::Running])?;
        self.scheduler.shutdown().await;
        self.state = PluginState::Stopped;
        info!(
            audits_completed = self.audits_completed(),
            "audit service stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PluginState::Running if self.scheduler.is_circuit_open() => HealthStatus::Degraded(
                "remote index unreachable, serving cached results".to_owned(),
            ),
            PluginState::Running => HealthStatus::Healthy,
            other => HealthStatus::Unhealthy(format!("service is {other}")),
        }
    }
}

/// [`AuditService`] 빌더
///
/// 지정하지 않은 협력 객체는 설정에서 만듭니다.
///
/// - 인덱스: [`HttpIndexClient`] (오프라인 대체가 켜져 있으면 응답 캐시 연결)
/// - 저장소: `persist`가 켜져 있으면 `data_dir`의 [`JsonFileStore`]
/// - 시계: [`SystemClock`]
pub struct AuditServiceBuilder {
    config: AuditorConfig,
    index: Option<Arc<dyn VulnerabilityIndex>>,
    store: Option<Arc<dyn PropertyStore>>,
    clock: Option<Arc<dyn Clock>>,
    coordinates: Option<Arc<dyn CoordinateResolver>>,
    listeners: Vec<Arc<dyn FindingListener>>,
    event_tx: Option<mpsc::Sender<FindingEvent>>,
    event_channel: bool,
}

impl AuditServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: AuditorConfig::default(),
            index: None,
            store: None,
            clock: None,
            coordinates: None,
            listeners: Vec::new(),
            event_tx: None,
            event_channel: true,
        }
    }

    pub fn config(mut self, config: AuditorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn index(mut self, index: Arc<dyn VulnerabilityIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn store(mut self, store: Arc<dyn PropertyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn coordinate_resolver(mut self, resolver: Arc<dyn CoordinateResolver>) -> Self {
        self.coordinates = Some(resolver);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn FindingListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// 외부 이벤트 송신 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 채널을 생성하고 수신 측을 반환합니다.
    pub fn event_sender(mut self, tx: mpsc::Sender<FindingEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// finding 이벤트 채널 사용 여부 (기본: 사용)
    pub fn event_channel(mut self, enabled: bool) -> Self {
        self.event_channel = enabled;
        self
    }

    /// 서비스를 생성합니다.
    ///
    /// # Errors
    ///
    /// - `AuditorError::Config`: 설정 검증 실패 또는 HTTP 클라이언트 생성 실패
    /// - `AuditorError::Store` / `AuditorError::Io`: 영속 저장소를 열 수 없음
    pub fn build(
        self,
    ) -> Result<(AuditService, Option<mpsc::Receiver<FindingEvent>>), AuditorError> {
        self.config.validate()?;
        let config = self.config;

        let store = match self.store {
            Some(store) => Some(store),
            None if config.persist => {
                Some(Arc::new(JsonFileStore::open(config.cache_path())?) as Arc<dyn PropertyStore>)
            }
            None => None,
        };

        let index = match self.index {
            Some(index) => index,
            None => {
                let mut client = HttpIndexClient::new(
                    config.index_url.clone(),
                    config.request_timeout(),
                    &config.user_agent,
                )?;
                if config.offline_fallback {
                    let responses = if config.persist {
                        ResponseCache::new(Arc::new(JsonFileStore::open(config.responses_path())?))
                    } else {
                        ResponseCache::in_memory()
                    };
                    client = client.with_response_cache(responses);
                }
                Arc::new(client)
            }
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let registry = Arc::new(match self.coordinates {
            Some(resolver) => ReaderRegistry::with_coordinate_resolver(config.reader_options(), resolver),
            None => ReaderRegistry::with_defaults(config.reader_options()),
        });

        let emitter = Arc::new(FindingEmitter::new());
        for listener in self.listeners {
            emitter.add_listener(listener);
        }
        let event_rx = match (self.event_tx, self.event_channel) {
            (Some(tx), _) => {
                emitter.add_listener(Arc::new(ChannelListener::new(tx)));
                None
            }
            (None, true) => {
                let (tx, rx) = mpsc::channel(config.event_channel_capacity);
                emitter.add_listener(Arc::new(ChannelListener::new(tx)));
                Some(rx)
            }
            (None, false) => None,
        };

        let cache = Arc::new(RefreshCache::new(
            config.staleness(),
            Arc::clone(&clock),
            store,
        ));
        let pipeline = Arc::new(AuditPipeline::new(
            index,
            Arc::clone(&registry),
            Arc::clone(&emitter),
            clock,
            config.max_file_size,
        ));
        let audits_completed = Arc::new(AtomicU64::new(0));
        let runner = Arc::new(CacheRefreshRunner {
            pipeline,
            cache: Arc::clone(&cache),
            audits_completed: Arc::clone(&audits_completed),
            endpoint: config.index_url.clone(),
        });
        let scheduler = ResolutionScheduler::new(Arc::clone(&runner) as Arc<dyn BatchRunner>);

        let service = AuditService {
            info: PluginInfo {
                name: "auditor".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                description: "dependency resolution and vulnerability correlation".to_owned(),
            },
            state: PluginState::Created,
            config,
            registry,
            emitter,
            cache,
            scheduler,
            runner,
            audits_completed,
        };
        Ok((service, event_rx))
    }
}

impl Default for AuditServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
