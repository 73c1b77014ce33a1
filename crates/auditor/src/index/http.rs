//! HTTP 인덱스 클라이언트
//!
//! [`HttpIndexClient`]는 원격 인덱스의 JSON API를 호출합니다.
//!
//! | 호출 | 요청 | 응답 |
//! |---|---|---|
//! | `find_artifacts` | `POST {base}/artifacts/search` `{"packages": [PackageRef]}` | `[[ArtifactRef]]` |
//! | `dependency_graph` | `GET {base}/artifacts/{id}/graph` | `[ArtifactRef]` |
//! | `find_scms` | `GET {base}/scms?ids=1,2` | `[ScmRef]` |
//! | `find_vulnerabilities` | `GET {base}/scms/{id}/vulnerabilities` | `[VulnerabilityRecord]` |
//!
//! 성공한 응답의 원본 JSON은 [`ResponseCache`]에 보관되고, 연결 실패 시
//! 같은 요청의 마지막 응답으로 대체됩니다. 대체할 응답이 없으면 연결 에러를 그대로 반환합니다.
//! 대체 횟수는 [`VulnerabilityIndex::fallback_responses`]로 노출되어, 파이프라인이
//! 해당 결과를 오프라인 데이터로 표시합니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use depwatch_core::metrics as m;

use super::{CALL_ARTIFACTS, CALL_GRAPH, CALL_SCMS, CALL_VULNERABILITIES, VulnerabilityIndex};
use crate::error::AuditorError;
use crate::store::ResponseCache;
use crate::types::{ArtifactRef, PackageRef, ScmRef, VulnerabilityRecord};

/// HTTP 인덱스 클라이언트
pub struct HttpIndexClient {
    client: Client,
    base_url: String,
    responses: Option<ResponseCache>,
    fallbacks: AtomicU64,
}

#[derive(Serialize)]
struct ArtifactSearch<'a> {
    packages: &'a [PackageRef],
}

impl HttpIndexClient {
    /// 새 클라이언트를 생성합니다.
    ///
    /// # Errors
    ///
    /// HTTP 클라이언트를 구성할 수 없으면 `AuditorError::Config`를 반환합니다.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, AuditorError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AuditorError::Config {
                field: "index".to_owned(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            responses: None,
            fallbacks: AtomicU64::new(0),
        })
    }

    /// 오프라인 대체용 응답 캐시를 연결합니다.
    pub fn with_response_cache(mut self, responses: ResponseCache) -> Self {
        self.responses = Some(responses);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// 요청을 보내고 응답 본문을 반환합니다.
    async fn fetch(&self, request: RequestBuilder, url: &str) -> Result<String, AuditorError> {
        let response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuditorError::Index(format!("HTTP {status} from {url}")));
        }
        response.text().await.map_err(|e| classify(url, e))
    }

    /// 요청을 실행하고 JSON으로 디코딩합니다. 연결 실패 시 응답 캐시로 대체합니다.
    async fn execute<T: DeserializeOwned>(
        &self,
        call: &'static str,
        cache_key: String,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, AuditorError> {
        let url = self.url(path);
        debug!(call, url = %url, "sending index request");

        match self.fetch(request, &url).await {
            Ok(body) => {
                let decoded = decode(call, &body)?;
                metrics::counter!(m::INDEX_REQUESTS_TOTAL, m::LABEL_CALL => call, m::LABEL_RESULT => "success")
                    .increment(1);
                if let Some(ref responses) = self.responses
                    && let Err(e) = responses.put(&cache_key, &body)
                {
                    warn!(call, error = %e, "failed to store index response");
                }
                Ok(decoded)
            }
            Err(err) => {
                metrics::counter!(m::INDEX_REQUESTS_TOTAL, m::LABEL_CALL => call, m::LABEL_RESULT => "failure")
                    .increment(1);
                if !err.is_connectivity() {
                    return Err(err);
                }
                let cached = match self.responses {
                    Some(ref responses) => responses.get(&cache_key).unwrap_or_else(|e| {
                        warn!(call, error = %e, "failed to read cached index response");
                        None
                    }),
                    None => None,
                };
                match cached {
                    Some(body) => {
                        warn!(call, error = %err, "index unreachable, using cached response");
                        metrics::counter!(m::INDEX_OFFLINE_FALLBACKS_TOTAL).increment(1);
                        let decoded = decode(call, &body)?;
                        self.fallbacks.fetch_add(1, Ordering::SeqCst);
                        Ok(decoded)
                    }
                    None => Err(err),
                }
            }
        }
    }
}

fn classify(url: &str, err: reqwest::Error) -> AuditorError {
    if err.is_connect() || err.is_timeout() {
        AuditorError::connectivity(url, err.to_string())
    } else {
        AuditorError::Index(format!("{url}: {err}"))
    }
}

fn decode<T: DeserializeOwned>(call: &str, body: &str) -> Result<T, AuditorError> {
    serde_json::from_str(body)
        .map_err(|e| AuditorError::Index(format!("failed to decode {call} response: {e}")))
}

#[async_trait]
impl VulnerabilityIndex for HttpIndexClient {
    async fn find_artifacts(
        &self,
        packages: &[PackageRef],
    ) -> Result<Vec<Vec<ArtifactRef>>, AuditorError> {
        let path = "/artifacts/search";
        let body = serde_json::to_string(&ArtifactSearch { packages })
            .map_err(|e| AuditorError::Index(format!("failed to encode request: {e}")))?;
        let request = self
            .client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone());
        self.execute(CALL_ARTIFACTS, format!("POST {path} {body}"), path, request)
            .await
    }

    async fn dependency_graph(&self, root: &ArtifactRef) -> Result<Vec<ArtifactRef>, AuditorError> {
        let path = format!("/artifacts/{}/graph", root.id);
        let request = self.client.get(self.url(&path));
        self.execute(CALL_GRAPH, format!("GET {path}"), &path, request)
            .await
    }

    async fn find_scms(&self, ids: &[i64]) -> Result<Vec<ScmRef>, AuditorError> {
        let joined = ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/scms?ids={joined}");
        let request = self.client.get(self.url(&path));
        self.execute(CALL_SCMS, format!("GET {path}"), &path, request)
            .await
    }

    async fn find_vulnerabilities(
        &self,
        scm: &ScmRef,
    ) -> Result<Vec<VulnerabilityRecord>, AuditorError> {
        let path = format!("/scms/{}/vulnerabilities", scm.id);
        let request = self.client.get(self.url(&path));
        self.execute(CALL_VULNERABILITIES, format!("GET {path}"), &path, request)
            .await
    }

    fn fallback_responses(&self) -> u64 {
        self.fallbacks.load(Ordering::SeqCst)
    }
}
