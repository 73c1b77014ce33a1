//! 해석 스케줄러 -- 단일 백그라운드 배치 작업과 서킷 브레이커
//!
//! [`ResolutionScheduler`]는 해석 요청(파일 키)을 버퍼에 모으고,
//! 동시에 하나만 실행되는 백그라운드 작업이 버퍼를 통째로 비워 배치로 처리합니다.
//!
//! # 동작
//!
//! - 버퍼에 있거나 처리 중인 키는 다시 넣어도 한 번만 처리됩니다.
//! - 배치가 끝나면 곧바로 버퍼를 다시 확인하고, 빌 때까지 후속 배치를 실행합니다.
//! - 배치 안에서 연결 실패가 나면 브레이커가 열리고(`reset_circuit()` 전까지 유지),
//!   나머지 배치와 대기 버퍼는 버려집니다. 버려진 키는 [`BatchRunner::abandoned`]로 통보됩니다.
//! - 취소 토큰은 파일 단위 사이에서 확인합니다. 이미 끝난 결과는 그대로 남습니다.
//!
//! 버퍼와 작업 플래그는 하나의 `std::sync::Mutex`를 공유하고,
//! 브레이커 플래그는 `AtomicBool`입니다.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use depwatch_core::metrics as m;

use crate::error::AuditorError;

/// 스케줄러 이벤트 채널 용량
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 배치의 파일 단위 작업 실행기
#[async_trait]
pub trait BatchRunner: Send + Sync + 'static {
    /// 키 하나를 해석합니다.
    async fn run_one(&self, key: &str) -> Result<(), AuditorError>;

    /// 처리되지 못하고 버려진 키를 통보받습니다.
    fn abandoned(&self, _keys: &[String]) {}
}

/// `enqueue` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// 새로 버퍼에 추가됨
    Queued,
    /// 이미 버퍼에 있거나 처리 중
    AlreadyQueued,
}

/// 스케줄러가 브로드캐스트하는 진행 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Resolved { key: String },
    Failed { key: String, reason: String },
    CircuitOpened { reason: String },
    Abandoned { keys: Vec<String> },
}

#[derive(Debug)]
struct State {
    pending: Vec<String>,
    queued: HashSet<String>,
    in_flight: HashSet<String>,
    job_running: bool,
    accepting: bool,
}

struct Inner {
    runner: Arc<dyn BatchRunner>,
    state: Mutex<State>,
    circuit_open: AtomicBool,
    cancel: Mutex<CancellationToken>,
    idle: Notify,
    events: broadcast::Sender<SchedulerEvent>,
    batches: AtomicU64,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn publish(&self, event: SchedulerEvent) {
        // 구독자가 없으면 버림
        let _ = self.events.send(event);
    }

    fn trip(&self, reason: &str) {
        if !self.circuit_open.swap(true, Ordering::SeqCst) {
            metrics::gauge!(m::SCHEDULER_CIRCUIT_OPEN).set(1.0);
            warn!(reason, "circuit breaker opened, background resolution suspended");
            self.publish(SchedulerEvent::CircuitOpened {
                reason: reason.to_owned(),
            });
        }
    }

    fn abandon(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        debug!(count = keys.len(), "abandoning unresolved keys");
        self.runner.abandoned(&keys);
        self.publish(SchedulerEvent::Abandoned { keys });
    }

    /// 다음 배치를 가져옵니다. 버퍼가 비었거나 취소되었으면 작업을 종료 상태로 바꿉니다.
    fn next_batch(&self, token: &CancellationToken) -> Option<Vec<String>> {
        let mut state = self.state();
        if state.pending.is_empty() || token.is_cancelled() {
            let dropped = std::mem::take(&mut state.pending);
            state.queued.clear();
            state.job_running = false;
            metrics::gauge!(m::SCHEDULER_PENDING).set(0.0);
            drop(state);
            self.abandon(dropped);
            self.idle.notify_waiters();
            return None;
        }
        let batch = std::mem::take(&mut state.pending);
        state.queued.clear();
        state.in_flight.extend(batch.iter().cloned());
        metrics::gauge!(m::SCHEDULER_PENDING).set(0.0);
        Some(batch)
    }

    fn finish_key(&self, key: &str) {
        self.state().in_flight.remove(key);
    }

    /// 배치를 중단합니다. 남은 배치 키와 대기 버퍼를 버립니다.
    fn abort_batch(&self, rest: Vec<String>) {
        let mut dropped = rest;
        {
            let mut state = self.state();
            for key in &dropped {
                state.in_flight.remove(key);
            }
            dropped.append(&mut state.pending);
            state.queued.clear();
        }
        metrics::gauge!(m::SCHEDULER_PENDING).set(0.0);
        self.abandon(dropped);
    }
}

async fn run_job(inner: Arc<Inner>) {
    loop {
        let token = inner.token();
        let Some(batch) = inner.next_batch(&token) else {
            debug!("resolution job idle");
            return;
        };

        let batch_no = inner.batches.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!(m::SCHEDULER_BATCHES_TOTAL).increment(1);
        debug!(batch = batch_no, size = batch.len(), "resolution batch started");

        let mut keys = batch.into_iter();
        while let Some(key) = keys.next() {
            if token.is_cancelled() {
                info!(batch = batch_no, "resolution batch cancelled");
                let mut rest = vec![key];
                rest.extend(keys);
                inner.abort_batch(rest);
                break;
            }

            match inner.runner.run_one(&key).await {
                Ok(()) => {
                    inner.finish_key(&key);
                    inner.publish(SchedulerEvent::Resolved { key });
                }
                Err(e) if e.is_connectivity() => {
                    let reason = e.to_string();
                    inner.finish_key(&key);
                    inner.trip(&reason);
                    inner.publish(SchedulerEvent::Failed { key, reason });
                    inner.abort_batch(keys.collect());
                    break;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "resolution failed");
                    inner.finish_key(&key);
                    inner.publish(SchedulerEvent::Failed {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

/// 해석 요청 스케줄러
///
/// 복제하면 같은 스케줄러를 가리킵니다.
#[derive(Clone)]
pub struct ResolutionScheduler {
    inner: Arc<Inner>,
}

impl ResolutionScheduler {
    pub fn new(runner: Arc<dyn BatchRunner>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                runner,
                state: Mutex::new(State {
                    pending: Vec::new(),
                    queued: HashSet::new(),
                    in_flight: HashSet::new(),
                    job_running: false,
                    accepting: true,
                }),
                circuit_open: AtomicBool::new(false),
                cancel: Mutex::new(CancellationToken::new()),
                idle: Notify::new(),
                events,
                batches: AtomicU64::new(0),
            }),
        }
    }

    /// 키를 버퍼에 넣고, 작업이 없으면 백그라운드 작업을 시작합니다.
    ///
    /// # Errors
    ///
    /// - `AuditorError::Connectivity`: 서킷 브레이커가 열려 있음
    /// - `AuditorError::Channel`: 스케줄러가 정지되었거나 tokio 런타임 밖에서 호출됨
    pub fn enqueue(&self, key: &str) -> Result<EnqueueOutcome, AuditorError> {
        if self.is_circuit_open() {
            return Err(AuditorError::connectivity(
                "scheduler",
                "circuit breaker is open",
            ));
        }

        let mut state = self.inner.state();
        if !state.accepting {
            return Err(AuditorError::Channel("scheduler is stopped".to_owned()));
        }
        if state.queued.contains(key) || state.in_flight.contains(key) {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        let handle = if state.job_running {
            None
        } else {
            let handle = Handle::try_current().map_err(|e| {
                AuditorError::Channel(format!("no tokio runtime for resolution job: {e}"))
            })?;
            Some(handle)
        };

        state.pending.push(key.to_owned());
        state.queued.insert(key.to_owned());
        metrics::gauge!(m::SCHEDULER_PENDING).set(state.pending.len() as f64);
        debug!(key, pending = state.pending.len(), "resolution enqueued");

        if let Some(handle) = handle {
            state.job_running = true;
            drop(state);
            handle.spawn(run_job(Arc::clone(&self.inner)));
        }
        Ok(EnqueueOutcome::Queued)
    }

    /// 버퍼가 비고 작업이 끝날 때까지 기다립니다.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state();
        !state.job_running && state.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// 지금까지 실행된 배치 수
    pub fn batches_run(&self) -> u64 {
        self.inner.batches.load(Ordering::Relaxed)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.inner.circuit_open.load(Ordering::SeqCst)
    }

    /// 배치 밖(예: 인라인 해석)에서 관측한 연결 실패로 브레이커를 엽니다.
    pub fn trip(&self, reason: &str) {
        self.inner.trip(reason);
    }

    /// 브레이커를 닫습니다.
    pub fn reset_circuit(&self) {
        if self.inner.circuit_open.swap(false, Ordering::SeqCst) {
            metrics::gauge!(m::SCHEDULER_CIRCUIT_OPEN).set(0.0);
            info!("circuit breaker reset");
        }
    }

    /// 진행 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// 새 요청을 거부하고 현재 작업에 취소를 요청합니다.
    pub fn cancel(&self) {
        self.inner.state().accepting = false;
        self.inner.token().cancel();
        info!("resolution scheduler stopping");
    }

    /// 취소를 요청하고 작업이 멈출 때까지 기다립니다.
    pub async fn shutdown(&self) {
        self.cancel();
        self.wait_idle().await;
        info!("resolution scheduler stopped");
    }

    /// 정지된 스케줄러를 다시 요청을 받는 상태로 되돌립니다.
    pub fn resume(&self) {
        *self.inner.cancel.lock().unwrap_or_else(|p| p.into_inner()) = CancellationToken::new();
        self.inner.state().accepting = true;
        debug!("resolution scheduler accepting requests");
    }
}
