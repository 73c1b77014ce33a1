//! 도메인 타입 — 크레이트 전역에서 공유하는 공통 타입

use std::fmt;

use serde::{Deserialize, Serialize};

/// 패키지 에코시스템
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// npm (package.json)
    Npm,
    /// Maven (pom.xml)
    Maven,
}

impl Ecosystem {
    /// Package URL 타입 문자열 (`pkg:npm/...`, `pkg:maven/...`)
    pub fn purl_type(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Maven => "maven",
        }
    }

    /// 문자열에서 에코시스템을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "npm" | "node" | "javascript" => Some(Self::Npm),
            "maven" | "mvn" | "java" => Some(Self::Maven),
            _ => None,
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.purl_type())
    }
}

/// finding 심각도
///
/// 영향을 주는 취약점이 있으면 `Error`, 영향이 없거나 판단할 수 없으면 `Info`,
/// 취약점 자체가 없으면 `None`입니다. 순서 비교가 가능합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    /// 취약점 없음
    #[default]
    None,
    /// 알려진 취약점이 있으나 해당 버전에 영향 없음 (또는 판단 불가)
    Info,
    /// 해당 버전에 영향을 주는 취약점
    Error,
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Info => write!(f, "info"),
            Self::Error => write!(f, "error"),
        }
    }
}
