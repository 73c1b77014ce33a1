//! 메트릭 이름 및 레이블 상수
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//! 레코더 설치는 임베더의 몫이며, 설치되지 않으면 매크로 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `depwatch_`
//! - 영역: `index_`, `cache_`, `scheduler_`, `audit_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 에코시스템 레이블 키 (npm, maven)
pub const LABEL_ECOSYSTEM: &str = "ecosystem";

/// 원격 호출 종류 레이블 키 (artifacts, graph, scms, vulnerabilities)
pub const LABEL_CALL: &str = "call";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 심각도 레이블 키 (error, info)
pub const LABEL_SEVERITY: &str = "severity";

// ─── 원격 인덱스 메트릭 ────────────────────────────────────────────

/// 원격 인덱스 요청 수 (counter, labels: call, result)
pub const INDEX_REQUESTS_TOTAL: &str = "depwatch_index_requests_total";

/// 오프라인 응답 캐시로 대체된 요청 수 (counter)
pub const INDEX_OFFLINE_FALLBACKS_TOTAL: &str = "depwatch_index_offline_fallbacks_total";

/// 응답 크기 불일치로 폐기된 배치 수 (counter)
pub const INDEX_PROTOCOL_MISMATCHES_TOTAL: &str = "depwatch_index_protocol_mismatches_total";

// ─── 캐시 메트릭 ────────────────────────────────────────────────────

/// fresh 캐시 적중 수 (counter)
pub const CACHE_HITS_TOTAL: &str = "depwatch_cache_hits_total";

/// stale 또는 미존재로 갱신이 필요했던 조회 수 (counter)
pub const CACHE_MISSES_TOTAL: &str = "depwatch_cache_misses_total";

// ─── 스케줄러 메트릭 ────────────────────────────────────────────────

/// 실행된 배치 작업 수 (counter)
pub const SCHEDULER_BATCHES_TOTAL: &str = "depwatch_scheduler_batches_total";

/// 대기 중인 파일 키 수 (gauge)
pub const SCHEDULER_PENDING: &str = "depwatch_scheduler_pending";

/// 서킷 브레이커 상태 (gauge, 1 = open)
pub const SCHEDULER_CIRCUIT_OPEN: &str = "depwatch_scheduler_circuit_open";

// ─── 감사 메트릭 ────────────────────────────────────────────────────

/// 감사 완료된 매니페스트 수 (counter, label: ecosystem)
pub const AUDIT_FILES_TOTAL: &str = "depwatch_audit_files_total";

/// 방출된 finding 수 (counter, label: severity)
pub const AUDIT_FINDINGS_TOTAL: &str = "depwatch_audit_findings_total";

/// 매니페스트 1건 감사 소요 시간 (histogram, 초)
pub const AUDIT_DURATION_SECONDS: &str = "depwatch_audit_duration_seconds";
