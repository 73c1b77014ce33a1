//! 버전 비교 및 제약 매칭
//!
//! [`Version`]은 느슨하게 파싱된 버전입니다. SemVer로 해석 가능하면 `semver` 크레이트의
//! 순서를 따르고, 그렇지 않으면(`1.0.Final`, `2.1.3.4`) 세그먼트 단위로 비교합니다.
//!
//! [`Constraint`]는 에코시스템별 버전 제약 문법을 해석합니다.
//!
//! - **npm**: `1.2.3`, `=1.2.3`, `>=1.0.0 <2.0.0`, `^1.2.3`, `~1.2.3`, `1.x`, `1.2.*`,
//!   `*`, `1.0.0 - 2.0.0`, `a || b`, 빈 문자열, `latest`
//! - **Maven**: `1.2.3` (정확히 일치), `[1.0,2.0)`, `(,1.5]`, `[1.2]`, `[1.0,1.2),[1.5,)`
//!
//! 잘못된 제약은 어떤 버전도 만족시키지 않으며 에러를 밖으로 던지지 않습니다.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuditorError;
use crate::types::Ecosystem;

/// 느슨하게 파싱된 버전
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    semver: Option<semver::Version>,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Num(u64),
    Text(String),
}

impl Version {
    /// 문자열에서 버전을 파싱합니다. 실패하지 않습니다.
    ///
    /// `v` 접두어를 허용하고, 누락된 minor/patch는 0으로 채웁니다.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix(['v', 'V', '='])
            .unwrap_or(trimmed)
            .trim();
        Self {
            raw: trimmed.to_owned(),
            semver: coerce_semver(body),
            segments: split_segments(body),
        }
    }

    /// 원본 문자열
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// SemVer로 해석된 경우 해당 값
    pub fn as_semver(&self) -> Option<&semver::Version> {
        self.semver.as_ref()
    }

    /// pre-release 태그가 있는 SemVer 버전인지 여부
    pub fn is_prerelease(&self) -> bool {
        self.semver.as_ref().is_some_and(|v| !v.pre.is_empty())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

fn coerce_semver(body: &str) -> Option<semver::Version> {
    if let Ok(v) = semver::Version::parse(body) {
        return Some(v);
    }
    let split_at = body.find(['-', '+']).unwrap_or(body.len());
    let (core, rest) = body.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    let mut nums = [0u64; 3];
    for (slot, part) in nums.iter_mut().zip(parts.iter()) {
        *slot = part.parse().ok()?;
    }
    semver::Version::parse(&format!("{}.{}.{}{rest}", nums[0], nums[1], nums[2])).ok()
}

fn split_segments(body: &str) -> Vec<Segment> {
    body.split(['.', '-', '_', '+'])
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u64>() {
            Ok(n) => Segment::Num(n),
            Err(_) => Segment::Text(s.to_lowercase()),
        })
        .collect()
}

/// Maven 한정자 순위. 알 수 없는 한정자는 0입니다.
fn qualifier_rank(q: &str) -> u8 {
    match q {
        "alpha" | "a" => 1,
        "beta" | "b" => 2,
        "milestone" | "m" => 3,
        "rc" | "cr" => 4,
        "snapshot" => 5,
        "final" | "ga" | "release" => 6,
        "sp" => 7,
        _ => 0,
    }
}

fn compare_segment(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Num(x), Segment::Num(y)) => x.cmp(y),
        (Segment::Text(x), Segment::Text(y)) => qualifier_rank(x)
            .cmp(&qualifier_rank(y))
            .then_with(|| x.cmp(y)),
        (Segment::Num(_), Segment::Text(_)) => Ordering::Greater,
        (Segment::Text(_), Segment::Num(_)) => Ordering::Less,
    }
}

/// 상대편에 없는 꼬리 세그먼트가 릴리스 대비 어떤 순서인지
fn trailing(seg: &Segment) -> Ordering {
    match seg {
        Segment::Num(0) => Ordering::Equal,
        Segment::Num(_) => Ordering::Greater,
        Segment::Text(q) => match qualifier_rank(q) {
            6 => Ordering::Equal,
            7 => Ordering::Greater,
            _ => Ordering::Less,
        },
    }
}

fn compare_segments(a: &[Segment], b: &[Segment]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let ord = match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => compare_segment(x, y),
            (Some(x), None) => trailing(x),
            (None, Some(y)) => trailing(y).reverse(),
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// 두 버전의 순서를 비교합니다.
///
/// 둘 다 SemVer이면 SemVer 순서, 아니면 세그먼트 비교를 사용합니다.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    match (&a.semver, &b.semver) {
        (Some(x), Some(y)) => x.cmp(y),
        _ => compare_segments(&a.segments, &b.segments),
    }
}

// ─── Constraint ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, v: &Version) -> bool {
        let ord = compare(v, &self.version);
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
        }
    }
}

/// 파싱된 버전 제약
///
/// 비교자 집합(AND)의 합집합(OR)으로 표현합니다. 빈 비교자 집합은 모든 버전과 일치합니다.
#[derive(Debug, Clone)]
pub struct Constraint {
    ecosystem: Ecosystem,
    raw: String,
    alternatives: Vec<Vec<Comparator>>,
}

impl Constraint {
    /// 에코시스템 문법에 따라 제약을 파싱합니다.
    ///
    /// # Errors
    ///
    /// 문법에 맞지 않으면 `AuditorError::VersionParse`를 반환합니다.
    pub fn parse(ecosystem: Ecosystem, raw: &str) -> Result<Self, AuditorError> {
        let alternatives = match ecosystem {
            Ecosystem::Npm => parse_npm(raw)?,
            Ecosystem::Maven => parse_maven(raw)?,
        };
        Ok(Self {
            ecosystem,
            raw: raw.trim().to_owned(),
            alternatives,
        })
    }

    /// 원본 제약 문자열
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 버전이 제약을 만족하는지 확인합니다.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|set| self.set_matches(set, version))
    }

    fn set_matches(&self, set: &[Comparator], version: &Version) -> bool {
        if !set.iter().all(|c| c.matches(version)) {
            return false;
        }
        // npm: pre-release 버전은 같은 major.minor.patch에 pre-release 비교자가 있을 때만 허용
        if self.ecosystem == Ecosystem::Npm
            && let Some(v) = version.as_semver()
            && !v.pre.is_empty()
        {
            return set.iter().any(|c| {
                c.version.as_semver().is_some_and(|cv| {
                    !cv.pre.is_empty()
                        && cv.major == v.major
                        && cv.minor == v.minor
                        && cv.patch == v.patch
                })
            });
        }
        true
    }
}

fn version_error(raw: &str, reason: impl Into<String>) -> AuditorError {
    AuditorError::VersionParse {
        version: raw.to_owned(),
        reason: reason.into(),
    }
}

fn bound(major: u64, minor: u64, patch: u64) -> Version {
    Version::parse(&format!("{major}.{minor}.{patch}"))
}

/// 와일드카드(`x`, `*`)나 생략이 허용되는 부분 버전
#[derive(Debug)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    tail: String,
}

impl Partial {
    fn parse(raw: &str, token: &str) -> Result<Self, AuditorError> {
        let token = token.strip_prefix(['v', 'V']).unwrap_or(token);
        if token.is_empty() {
            return Err(version_error(raw, "missing version"));
        }
        let split_at = token.find(['-', '+']).unwrap_or(token.len());
        let (core, tail) = token.split_at(split_at);
        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(version_error(raw, format!("too many components in '{token}'")));
        }

        let mut nums: [Option<u64>; 3] = [None; 3];
        let mut wildcard = false;
        for (slot, part) in nums.iter_mut().zip(parts.iter()) {
            if matches!(*part, "x" | "X" | "*") {
                wildcard = true;
                continue;
            }
            if wildcard {
                // 1.x.3 처럼 와일드카드 뒤의 숫자는 무시합니다
                continue;
            }
            *slot = Some(
                part.parse()
                    .map_err(|_| version_error(raw, format!("invalid component '{part}'")))?,
            );
        }

        Ok(Self {
            major: nums[0],
            minor: nums[1],
            patch: nums[2],
            tail: tail.to_owned(),
        })
    }

    fn full(&self) -> Option<Version> {
        match (self.major, self.minor, self.patch) {
            (Some(ma), Some(mi), Some(pa)) => {
                Some(Version::parse(&format!("{ma}.{mi}.{pa}{}", self.tail)))
            }
            _ => None,
        }
    }

    fn floor(&self) -> Version {
        self.full().unwrap_or_else(|| {
            bound(
                self.major.unwrap_or(0),
                self.minor.unwrap_or(0),
                self.patch.unwrap_or(0),
            )
        })
    }
}

/// 아무 버전과도 일치하지 않는 비교자 집합
fn nothing() -> Vec<Comparator> {
    vec![Comparator::new(Op::Lt, bound(0, 0, 0))]
}

fn parse_npm(raw: &str) -> Result<Vec<Vec<Comparator>>, AuditorError> {
    raw.split("||")
        .map(|part| parse_npm_set(raw, part.trim()))
        .collect()
}

fn parse_npm_set(raw: &str, part: &str) -> Result<Vec<Comparator>, AuditorError> {
    if part.is_empty() || matches!(part, "*" | "x" | "X") || part.eq_ignore_ascii_case("latest") {
        return Ok(Vec::new());
    }

    if let Some((lo, hi)) = part.split_once(" - ") {
        return parse_hyphen(raw, lo.trim(), hi.trim());
    }

    // ">= 1.2.3" 처럼 연산자와 버전 사이에 공백이 있으면 합칩니다
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in part.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~')) {
            pending_op.push_str(token);
        } else {
            tokens.push(format!("{pending_op}{token}"));
            pending_op.clear();
        }
    }
    if !pending_op.is_empty() {
        return Err(version_error(raw, format!("dangling operator '{pending_op}'")));
    }

    let mut set = Vec::new();
    for token in &tokens {
        set.extend(desugar_npm(raw, token)?);
    }
    Ok(set)
}

fn parse_hyphen(raw: &str, lo: &str, hi: &str) -> Result<Vec<Comparator>, AuditorError> {
    let lo = Partial::parse(raw, lo)?;
    let hi = Partial::parse(raw, hi)?;
    let mut set = Vec::new();
    if lo.major.is_some() {
        set.push(Comparator::new(Op::Ge, lo.floor()));
    }
    match (hi.major, hi.minor, hi.full()) {
        (_, _, Some(full)) => set.push(Comparator::new(Op::Le, full)),
        (Some(ma), Some(mi), None) => {
            set.push(Comparator::new(Op::Lt, bound(ma, mi.saturating_add(1), 0)))
        }
        (Some(ma), None, None) => set.push(Comparator::new(Op::Lt, bound(ma.saturating_add(1), 0, 0))),
        (None, _, None) => {}
    }
    Ok(set)
}

fn desugar_npm(raw: &str, token: &str) -> Result<Vec<Comparator>, AuditorError> {
    let (op, rest) = if let Some(r) = token.strip_prefix(">=") {
        (">=", r)
    } else if let Some(r) = token.strip_prefix("<=") {
        ("<=", r)
    } else if let Some(r) = token.strip_prefix('>') {
        (">", r)
    } else if let Some(r) = token.strip_prefix('<') {
        ("<", r)
    } else if let Some(r) = token.strip_prefix('^') {
        ("^", r)
    } else if let Some(r) = token.strip_prefix("~>") {
        ("~", r)
    } else if let Some(r) = token.strip_prefix('~') {
        ("~", r)
    } else if let Some(r) = token.strip_prefix('=') {
        ("=", r)
    } else {
        ("=", token)
    };

    let p = Partial::parse(raw, rest)?;
    let Some(major) = p.major else {
        // 와일드카드: >*, <* 는 아무것도 만족하지 않고 나머지는 모두 만족합니다
        return Ok(match op {
            ">" | "<" => nothing(),
            _ => Vec::new(),
        });
    };
    let next_major = bound(major.saturating_add(1), 0, 0);

    let set = match op {
        "=" => match (p.minor, p.full()) {
            (_, Some(full)) => vec![Comparator::new(Op::Eq, full)],
            (Some(minor), None) => vec![
                Comparator::new(Op::Ge, p.floor()),
                Comparator::new(Op::Lt, bound(major, minor.saturating_add(1), 0)),
            ],
            (None, None) => vec![Comparator::new(Op::Ge, p.floor()), Comparator::new(Op::Lt, next_major)],
        },
        "^" => {
            let upper = match (major, p.minor, p.patch) {
                (0, Some(0), Some(patch)) => bound(0, 0, patch.saturating_add(1)),
                (0, Some(minor), _) => bound(0, minor.saturating_add(1), 0),
                _ => next_major,
            };
            vec![Comparator::new(Op::Ge, p.floor()), Comparator::new(Op::Lt, upper)]
        }
        "~" => {
            let upper = match p.minor {
                Some(minor) => bound(major, minor.saturating_add(1), 0),
                None => next_major,
            };
            vec![Comparator::new(Op::Ge, p.floor()), Comparator::new(Op::Lt, upper)]
        }
        ">" => match (p.minor, p.full()) {
            (_, Some(full)) => vec![Comparator::new(Op::Gt, full)],
            (Some(minor), None) => vec![Comparator::new(
                Op::Ge,
                bound(major, minor.saturating_add(1), 0),
            )],
            (None, None) => vec![Comparator::new(Op::Ge, next_major)],
        },
        ">=" => vec![Comparator::new(Op::Ge, p.floor())],
        "<" => vec![Comparator::new(Op::Lt, p.floor())],
        "<=" => match (p.minor, p.full()) {
            (_, Some(full)) => vec![Comparator::new(Op::Le, full)],
            (Some(minor), None) => vec![Comparator::new(
                Op::Lt,
                bound(major, minor.saturating_add(1), 0),
            )],
            (None, None) => vec![Comparator::new(Op::Lt, next_major)],
        },
        _ => return Err(version_error(raw, format!("unknown operator '{op}'"))),
    };
    Ok(set)
}

fn parse_maven(raw: &str) -> Result<Vec<Vec<Comparator>>, AuditorError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(vec![Vec::new()]);
    }
    if s.contains("${") {
        return Err(version_error(raw, "unresolved property reference"));
    }
    if !s.starts_with(['[', '(']) {
        return Ok(vec![vec![Comparator::new(Op::Eq, Version::parse(s))]]);
    }

    let mut alternatives = Vec::new();
    let mut rest = s;
    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }
        let inclusive_lo = match rest.as_bytes()[0] {
            b'[' => true,
            b'(' => false,
            _ => return Err(version_error(raw, "expected '[' or '('")),
        };
        let close_idx = rest
            .find([']', ')'])
            .ok_or_else(|| version_error(raw, "unterminated range"))?;
        let inclusive_hi = rest.as_bytes()[close_idx] == b']';
        let inner = &rest[1..close_idx];

        let set = match inner.split_once(',') {
            None => {
                let exact = inner.trim();
                if !(inclusive_lo && inclusive_hi) || exact.is_empty() {
                    return Err(version_error(raw, "single-version range must be [x]"));
                }
                vec![Comparator::new(Op::Eq, Version::parse(exact))]
            }
            Some((lo, hi)) => {
                let mut set = Vec::new();
                if !lo.trim().is_empty() {
                    let op = if inclusive_lo { Op::Ge } else { Op::Gt };
                    set.push(Comparator::new(op, Version::parse(lo)));
                }
                if !hi.trim().is_empty() {
                    let op = if inclusive_hi { Op::Le } else { Op::Lt };
                    set.push(Comparator::new(op, Version::parse(hi)));
                }
                set
            }
        };
        alternatives.push(set);
        rest = &rest[close_idx + 1..];
    }

    if alternatives.is_empty() {
        return Err(version_error(raw, "empty range list"));
    }
    Ok(alternatives)
}

// ─── 매칭 API ───────────────────────────────────────────────────────

/// 버전이 제약을 만족하는지 확인합니다.
///
/// 잘못된 제약은 어떤 버전도 만족시키지 않습니다.
pub fn satisfies(ecosystem: Ecosystem, version: &Version, constraint: &str) -> bool {
    match Constraint::parse(ecosystem, constraint) {
        Ok(parsed) => parsed.matches(version),
        Err(e) => {
            debug!(constraint, error = %e, "malformed version constraint, treating as unsatisfiable");
            false
        }
    }
}

/// 제약을 만족하는 후보 중 가장 높은 버전을 고릅니다.
///
/// 만족하는 후보가 없거나 제약이 잘못되었으면 `None`을 반환합니다.
pub fn best_match<'a, T>(
    ecosystem: Ecosystem,
    constraint: &str,
    candidates: &'a [T],
    version_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    let parsed = match Constraint::parse(ecosystem, constraint) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(constraint, error = %e, "malformed version constraint, no candidate selected");
            return None;
        }
    };
    candidates
        .iter()
        .map(|c| (c, Version::parse(version_of(c))))
        .filter(|(_, v)| parsed.matches(v))
        .max_by(|(_, a), (_, b)| compare(a, b))
        .map(|(c, _)| c)
}

// ─── 영향 범위 ──────────────────────────────────────────────────────

/// 취약점 영향 범위
///
/// - `introduced`가 None이면 시작 제한 없음
/// - `fixed`가 None이면 아직 수정되지 않음
/// - `introduced <= version < fixed`이면 영향받음
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionRange {
    /// 취약점이 도입된 버전
    #[serde(default)]
    pub introduced: Option<String>,
    /// 취약점이 수정된 버전
    #[serde(default)]
    pub fixed: Option<String>,
}

impl VersionRange {
    /// 버전이 이 범위에 포함되는지 확인합니다.
    pub fn contains(&self, version: &Version) -> bool {
        if let Some(ref introduced) = self.introduced
            && compare(version, &Version::parse(introduced)) == Ordering::Less
        {
            return false;
        }
        if let Some(ref fixed) = self.fixed
            && compare(version, &Version::parse(fixed)) != Ordering::Less
        {
            return false;
        }
        true
    }
}

/// 여러 범위 중 하나라도 버전을 포함하면 `true`를 반환합니다.
pub fn is_affected(version: &Version, ranges: &[VersionRange]) -> bool {
    ranges.iter().any(|r| r.contains(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    fn npm(version: &str, constraint: &str) -> bool {
        satisfies(Ecosystem::Npm, &v(version), constraint)
    }

    fn maven(version: &str, constraint: &str) -> bool {
        satisfies(Ecosystem::Maven, &v(version), constraint)
    }

    #[test]
    fn loose_parse_fills_missing_components() {
        assert_eq!(v("1.2").as_semver(), Some(&semver::Version::new(1, 2, 0)));
        assert_eq!(v("v3").as_semver(), Some(&semver::Version::new(3, 0, 0)));
        assert_eq!(v("1.2.3").as_str(), "1.2.3");
    }

    #[test]
    fn semver_ordering_with_prerelease() {
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.10.0") > v("1.9.0"));
    }

    #[test]
    fn segment_fallback_for_non_semver() {
        assert!(v("1.2.3.4") > v("1.2.3.3"));
        assert!(v("1.2.3.10") > v("1.2.3.9"));
        assert_eq!(compare(&v("1.0.Final"), &v("1.0")), Ordering::Equal);
        assert!(v("2.0.0.RC1") < v("2.0.0.Final"));
        assert!(v("1.0.SP1") > v("1.0"));
    }

    #[test]
    fn maven_qualifiers_sort_before_release() {
        assert!(v("1.0-SNAPSHOT") < v("1.0"));
        assert!(v("1.0.alpha") < v("1.0.beta"));
        assert!(v("1.0.beta") < v("1.0.rc"));
    }

    #[test]
    fn npm_exact_and_equals() {
        assert!(npm("1.2.3", "1.2.3"));
        assert!(npm("1.2.3", "=1.2.3"));
        assert!(npm("1.2.3", "v1.2.3"));
        assert!(!npm("1.2.4", "1.2.3"));
    }

    #[test]
    fn npm_caret_ranges() {
        assert!(npm("4.17.21", "^4.17.0"));
        assert!(npm("4.18.0", "^4.17.0"));
        assert!(!npm("5.0.0", "^4.17.0"));
        assert!(!npm("4.16.9", "^4.17.0"));
        assert!(npm("0.2.5", "^0.2.3"));
        assert!(!npm("0.3.0", "^0.2.3"));
        assert!(npm("0.0.3", "^0.0.3"));
        assert!(!npm("0.0.4", "^0.0.3"));
    }

    #[test]
    fn npm_tilde_ranges() {
        assert!(npm("4.17.21", "~4.17.0"));
        assert!(!npm("4.18.0", "~4.17.0"));
        assert!(npm("1.9.0", "~1"));
        assert!(!npm("2.0.0", "~1"));
    }

    #[test]
    fn npm_comparator_sets_and_unions() {
        assert!(npm("1.5.0", ">=1.0.0 <2.0.0"));
        assert!(npm("1.5.0", ">= 1.0.0 < 2.0.0"));
        assert!(!npm("2.0.0", ">=1.0.0 <2.0.0"));
        assert!(npm("3.1.0", "^1.0.0 || ^3.0.0"));
        assert!(!npm("2.1.0", "^1.0.0 || ^3.0.0"));
    }

    #[test]
    fn npm_hyphen_ranges() {
        assert!(npm("1.5.0", "1.0.0 - 2.0.0"));
        assert!(npm("2.0.0", "1.0.0 - 2.0.0"));
        assert!(!npm("2.0.1", "1.0.0 - 2.0.0"));
        assert!(npm("2.3.9", "1.0 - 2.3"));
        assert!(!npm("2.4.0", "1.0 - 2.3"));
    }

    #[test]
    fn npm_wildcards() {
        assert!(npm("9.9.9", "*"));
        assert!(npm("9.9.9", ""));
        assert!(npm("9.9.9", "latest"));
        assert!(npm("1.4.2", "1.x"));
        assert!(!npm("2.0.0", "1.x"));
        assert!(npm("1.2.7", "1.2.*"));
        assert!(!npm("1.3.0", "1.2.x"));
        assert!(npm("1.9.0", "1"));
    }

    #[test]
    fn npm_partial_comparators() {
        assert!(npm("1.3.0", ">1.2"));
        assert!(!npm("1.2.9", ">1.2"));
        assert!(npm("1.2.9", "<=1.2"));
        assert!(!npm("1.3.0", "<=1.2"));
        assert!(!npm("1.2.0", "<1.2"));
    }

    #[test]
    fn npm_prerelease_requires_matching_tuple() {
        assert!(!npm("2.0.0-beta.1", "^1.0.0 || >=1.5.0"));
        assert!(npm("2.0.0-beta.2", ">=2.0.0-beta.1"));
        assert!(!npm("2.1.0-beta.2", ">=2.0.0-beta.1"));
    }

    #[test]
    fn malformed_constraint_satisfies_nothing() {
        assert!(!npm("1.0.0", "^^1"));
        assert!(!npm("1.0.0", "not-a-version"));
        assert!(!npm("1.0.0", ">="));
        assert!(!maven("1.0.0", "${project.version}"));
        assert!(!maven("1.0.0", "[1.0"));
    }

    #[test]
    fn constraint_parse_reports_version_error() {
        let err = Constraint::parse(Ecosystem::Npm, "~>x.y").unwrap_err();
        assert!(matches!(err, AuditorError::VersionParse { .. }));
    }

    #[test]
    fn maven_soft_requirement_is_exact() {
        assert!(maven("4.13.2", "4.13.2"));
        assert!(!maven("4.13.1", "4.13.2"));
        assert!(maven("2.0", "2.0.0"));
    }

    #[test]
    fn maven_bracket_ranges() {
        assert!(maven("1.5", "[1.0,2.0)"));
        assert!(maven("1.0", "[1.0,2.0)"));
        assert!(!maven("2.0", "[1.0,2.0)"));
        assert!(maven("1.5", "(,1.5]"));
        assert!(!maven("1.6", "(,1.5]"));
        assert!(maven("1.2", "[1.2]"));
        assert!(!maven("1.0", "(1.0,)"));
        assert!(maven("3.0", "[1.0,1.2),[1.5,)"));
        assert!(!maven("1.3", "[1.0,1.2),[1.5,)"));
    }

    #[test]
    fn best_match_caret_allows_npm_minor_bumps() {
        // npm: ^4.17.0 == >=4.17.0 <5.0.0
        let candidates = ["4.17.0", "4.17.21", "4.18.0", "5.0.0"];
        let caret = best_match(Ecosystem::Npm, "^4.17.0", &candidates, |c| c);
        assert_eq!(caret, Some(&"4.18.0"));
    }

    #[test]
    fn best_match_tilde_or_bounded_range_stays_on_minor() {
        let candidates = ["4.17.0", "4.17.21", "4.18.0"];
        let tilde = best_match(Ecosystem::Npm, "~4.17.0", &candidates, |c| c);
        assert_eq!(tilde, Some(&"4.17.21"));

        let bounded = best_match(Ecosystem::Npm, ">=4.17.0 <4.18.0", &candidates, |c| c);
        assert_eq!(bounded, Some(&"4.17.21"));
    }

    #[test]
    fn best_match_none_when_nothing_satisfies() {
        let candidates = ["1.0.0", "1.1.0"];
        assert_eq!(best_match(Ecosystem::Npm, "^2.0.0", &candidates, |c| c), None);
        assert_eq!(best_match(Ecosystem::Npm, "^^2", &candidates, |c| c), None);
        let empty: [&str; 0] = [];
        assert_eq!(best_match(Ecosystem::Npm, "*", &empty, |c| c), None);
    }

    #[test]
    fn range_contains_bounds() {
        let range = VersionRange {
            introduced: Some("1.0.0".to_owned()),
            fixed: Some("1.0.5".to_owned()),
        };
        assert!(range.contains(&v("1.0.0")));
        assert!(range.contains(&v("1.0.4")));
        assert!(!range.contains(&v("1.0.5")));
        assert!(!range.contains(&v("0.9.9")));
    }

    #[test]
    fn is_affected_any_range() {
        let ranges = vec![
            VersionRange {
                introduced: None,
                fixed: Some("4.17.12".to_owned()),
            },
            VersionRange {
                introduced: Some("5.0.0".to_owned()),
                fixed: None,
            },
        ];
        assert!(is_affected(&v("4.17.11"), &ranges));
        assert!(!is_affected(&v("4.17.21"), &ranges));
        assert!(is_affected(&v("5.1.0"), &ranges));
        assert!(!is_affected(&v("1.0.0"), &[]));
    }
}
