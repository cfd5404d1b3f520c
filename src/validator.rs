//! Email-level validation: syntax check, domain resolution and the final
//! response shape returned to API clients.

use crate::engine::{AllowReason, BlockReason, DomainResolver, RiskLevel, VerdictResult};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::debug;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

const SYNTAX_SOURCE: &str = "Syntax Validation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxStatus {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Valid,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationDetails {
    pub syntax: SyntaxStatus,
    pub domain: DomainStatus,
    pub mx_records: bool,
    pub disposable: bool,
    pub blocked: bool,
    pub block_reason: Option<BlockReason>,
    pub allow_reason: Option<AllowReason>,
    pub detection_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailValidationResult {
    pub email: String,
    pub domain: String,
    pub valid: bool,
    pub disposable: bool,
    pub blocked: bool,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub details: ValidationDetails,
    pub response_time_ms: u64,
}

impl EmailValidationResult {
    fn invalid_syntax(email: &str, domain: String, started: Instant) -> Self {
        Self {
            email: email.to_string(),
            domain,
            valid: false,
            disposable: false,
            blocked: false,
            confidence: 0.0,
            risk_level: RiskLevel::Low,
            details: ValidationDetails {
                syntax: SyntaxStatus::Invalid,
                domain: DomainStatus::Unknown,
                mx_records: false,
                disposable: false,
                blocked: false,
                block_reason: None,
                allow_reason: None,
                detection_source: SYNTAX_SOURCE.to_string(),
            },
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn from_verdict(email: &str, domain: String, verdict: VerdictResult, started: Instant) -> Self {
        Self {
            email: email.to_string(),
            domain,
            valid: !verdict.is_blocked,
            disposable: verdict.is_disposable,
            blocked: verdict.is_blocked,
            confidence: overall_confidence(&verdict),
            risk_level: verdict.risk_level,
            details: ValidationDetails {
                syntax: SyntaxStatus::Valid,
                // No DNS probing: a syntactically valid domain is reported as
                // valid with MX assumed present.
                domain: DomainStatus::Valid,
                mx_records: true,
                disposable: verdict.is_disposable,
                blocked: verdict.is_blocked,
                block_reason: verdict.block_reason,
                allow_reason: verdict.allow_reason,
                detection_source: verdict.source,
            },
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Domain part after the last `@`, lowercased; `None` when absent or empty.
pub fn extract_domain(email: &str) -> Option<String> {
    let (_, domain) = email.trim().rsplit_once('@')?;
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() {
        return None;
    }
    Some(domain)
}

pub fn is_valid_syntax(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// 0.3 base + 0.2 for valid syntax + 0.3 when not blocked, then 20% of the
/// domain verdict's own confidence, capped at 1.0.
pub fn overall_confidence(verdict: &VerdictResult) -> f64 {
    let mut confidence = 0.3 + 0.2;
    if !verdict.is_blocked {
        confidence += 0.3;
    }
    (confidence + verdict.confidence * 0.2).min(1.0)
}

pub struct EmailValidator {
    resolver: Arc<DomainResolver>,
}

impl EmailValidator {
    pub fn new(resolver: Arc<DomainResolver>) -> Self {
        Self { resolver }
    }

    pub async fn validate(&self, email: &str, user_id: Option<&str>) -> EmailValidationResult {
        let started = Instant::now();

        let Some(domain) = extract_domain(email) else {
            debug!("No domain in '{}', skipping resolution", email);
            return EmailValidationResult::invalid_syntax(email, String::new(), started);
        };

        if !is_valid_syntax(email) {
            debug!("Syntax check failed for '{}'", email);
            return EmailValidationResult::invalid_syntax(email, domain, started);
        }

        let verdict = self.resolver.resolve(&domain, user_id).await;
        EmailValidationResult::from_verdict(email, domain, verdict, started)
    }
}
