//! 원격 취약점 인덱스 인터페이스
//!
//! [`VulnerabilityIndex`]는 파이프라인이 원격 인덱스를 호출하는 유일한 경로입니다.
//! 배치 호출(`find_artifacts`, `find_scms`)의 응답은 요청과 위치로 대응해야 하며,
//! 길이 검증은 호출자(resolver, correlator)가 수행합니다.
//!
//! # 구현
//!
//! - [`HttpIndexClient`]: HTTP JSON API + 오프라인 응답 캐시
//! - [`LocalIndex`]: 로컬 JSON 스냅샷 (오프라인 감사, 테스트)

pub mod http;
pub mod local;

use async_trait::async_trait;

pub use http::HttpIndexClient;
pub use local::LocalIndex;

use crate::error::AuditorError;
use crate::types::{ArtifactRef, PackageRef, ScmRef, VulnerabilityRecord};

/// 원격 호출 이름 (로그, 메트릭 레이블)
pub const CALL_ARTIFACTS: &str = "find_artifacts";
pub const CALL_GRAPH: &str = "dependency_graph";
pub const CALL_SCMS: &str = "find_scms";
pub const CALL_VULNERABILITIES: &str = "find_vulnerabilities";

/// 원격 취약점 인덱스
#[async_trait]
pub trait VulnerabilityIndex: Send + Sync {
    /// 패키지마다 후보 아티팩트 목록을 조회합니다.
    ///
    /// 응답의 i번째 목록은 요청의 i번째 패키지에 대응합니다.
    async fn find_artifacts(
        &self,
        packages: &[PackageRef],
    ) -> Result<Vec<Vec<ArtifactRef>>, AuditorError>;

    /// 아티팩트의 전이 의존성 그래프를 평탄화하여 조회합니다.
    async fn dependency_graph(&self, root: &ArtifactRef) -> Result<Vec<ArtifactRef>, AuditorError>;

    /// SCM 레코드를 조회합니다. 응답의 i번째 레코드는 i번째 id에 대응합니다.
    async fn find_scms(&self, ids: &[i64]) -> Result<Vec<ScmRef>, AuditorError>;

    /// 저장소에 알려진 취약점을 조회합니다.
    async fn find_vulnerabilities(
        &self,
        scm: &ScmRef,
    ) -> Result<Vec<VulnerabilityRecord>, AuditorError>;

    /// 연결 실패 대신 저장된 응답으로 답한 누적 횟수 (단조 증가)
    fn fallback_responses(&self) -> u64 {
        0
    }
}
