// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # IP Rate Limiting
//!
//! Fixed-window request quotas per client address.
//!
//! A rule names an endpoint pattern, a period and a limit:
//!
//! | Endpoint          | Matches                                   |
//! |-------------------|-------------------------------------------|
//! | `*`               | every request                             |
//! | `post:/v1/subscribe` | that verb and path                     |
//! | `*:/v1/auth/*`    | any verb, any path under `/v1/auth/`      |
//!
//! Periods are written `{n}s`, `{n}m`, `{n}h` or `{n}d`. A window starts
//! with the first request counted in it and ends one period later.
//!
//! With endpoint rate limiting disabled only `*` rules apply and a client
//! shares one counter per period across all endpoints. With it enabled every
//! matching rule applies and counters are kept per endpoint.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use lru::LruCache;
use tracing::{error, info};

pub const X_RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
pub const X_RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
pub const X_RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";
const DEFAULT_COUNTER_CAPACITY: usize = 100_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("invalid rate limit period '{0}'")]
    InvalidPeriod(String),

    #[error("invalid rate limit rule: {0}")]
    InvalidRule(String),
}

/// Longest accepted period.
pub const MAX_PERIOD_DAYS: i64 = 36_500;

/// Parse a period such as `1s`, `15m`, `12h` or `7d`.
pub fn parse_period(period: &str) -> Result<Duration, RateLimitError> {
    let period = period.trim();
    let invalid = || RateLimitError::InvalidPeriod(period.to_string());
    if period.len() < 2 {
        return Err(invalid());
    }
    let (value, unit) = period.split_at(period.len() - 1);
    let value: i64 = value.parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }
    let span = match unit {
        "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        _ => None,
    }
    .ok_or_else(invalid)?;
    if span > Duration::days(MAX_PERIOD_DAYS) {
        return Err(invalid());
    }
    Ok(span)
}

/// End of a window, saturating instead of overflowing.
fn window_end(started: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    started
        .checked_add_signed(span)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `*`, or `verb:path` where the verb may be `*` and the path may end in `*`.
fn endpoint_matches(pattern: &str, method: &str, path: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    let Some((verb, path_pattern)) = pattern.split_once(':') else {
        return false;
    };
    if verb != "*" && !verb.eq_ignore_ascii_case(method) {
        return false;
    }
    let path = path.to_ascii_lowercase();
    let path_pattern = path_pattern.to_ascii_lowercase();
    match path_pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == path_pattern,
    }
}

/// A quota: at most `limit` requests per `period` on `endpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub endpoint: String,
    /// As configured, e.g. `15m`
    pub period: String,
    pub period_span: Duration,
    pub limit: u64,
}

impl RateLimitRule {
    pub fn new(
        endpoint: impl Into<String>,
        period: impl Into<String>,
        limit: u64,
    ) -> Result<Self, RateLimitError> {
        let endpoint = endpoint.into();
        let period = period.into();
        if endpoint.trim() != "*" && !endpoint.contains(':') {
            return Err(RateLimitError::InvalidRule(format!(
                "endpoint '{endpoint}' must be '*' or 'verb:path'"
            )));
        }
        let period_span = parse_period(&period)?;
        Ok(Self {
            endpoint,
            period,
            period_span,
            limit,
        })
    }

    /// Parse `endpoint=period=limit`.
    pub fn parse(value: &str) -> Result<Self, RateLimitError> {
        let mut parts = value.split('=').map(str::trim);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(endpoint), Some(period), Some(limit), None) => {
                let limit = limit
                    .parse()
                    .map_err(|_| RateLimitError::InvalidRule(value.to_string()))?;
                Self::new(endpoint, period, limit)
            }
            _ => Err(RateLimitError::InvalidRule(value.to_string())),
        }
    }

    fn is_global(&self) -> bool {
        self.endpoint.trim() == "*"
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    pub general_rules: Vec<RateLimitRule>,
    pub ip_whitelist: Vec<String>,
    /// Endpoint patterns never limited
    pub endpoint_whitelist: Vec<String>,
    /// Header carrying the client address set by a trusted proxy
    pub real_ip_header: String,
    pub enable_endpoint_rate_limiting: bool,
    /// Count rejected requests against the quota
    pub stack_blocked_requests: bool,
    pub http_status_code: StatusCode,
    /// Overrides the default quota message
    pub quota_exceeded_message: Option<String>,
    /// Maximum number of live counters
    pub counter_capacity: usize,
}

impl RateLimitOptions {
    pub fn default_rules() -> Vec<RateLimitRule> {
        [("1s", 2), ("15m", 100), ("12h", 1000), ("7d", 10000)]
            .into_iter()
            .filter_map(|(period, limit)| RateLimitRule::new("*", period, limit).ok())
            .collect()
    }
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            general_rules: Self::default_rules(),
            ip_whitelist: Vec::new(),
            endpoint_whitelist: Vec::new(),
            real_ip_header: "X-Real-IP".to_string(),
            enable_endpoint_rate_limiting: false,
            stack_blocked_requests: false,
            http_status_code: StatusCode::TOO_MANY_REQUESTS,
            quota_exceeded_message: None,
            counter_capacity: DEFAULT_COUNTER_CAPACITY,
        }
    }
}

/// The parts of a request the limiter looks at.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub client_ip: String,
    pub method: String,
    pub path: String,
}

impl ClientRequest {
    pub fn new(
        client_ip: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            client_ip: client_ip.into(),
            method: method.into(),
            path: path.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.method, self.path).to_ascii_lowercase()
    }
}

/// Quota state reported on allowed requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit: u64,
    pub remaining: u64,
    pub reset: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// `None` when no rule applied (whitelisted or unmatched)
    Allowed(Option<QuotaStatus>),
    Blocked {
        rule: RateLimitRule,
        retry_after_secs: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    started: DateTime<Utc>,
    count: u64,
}

pub struct IpRateLimiter {
    options: RateLimitOptions,
    counters: Mutex<LruCache<String, Counter>>,
}

impl IpRateLimiter {
    pub fn new(options: RateLimitOptions) -> Self {
        let capacity = NonZeroUsize::new(options.counter_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            options,
            counters: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn options(&self) -> &RateLimitOptions {
        &self.options
    }

    pub fn check(&self, request: &ClientRequest) -> RateLimitDecision {
        self.check_at(request, Utc::now())
    }

    pub fn check_at(&self, request: &ClientRequest, now: DateTime<Utc>) -> RateLimitDecision {
        if self.is_whitelisted(request) {
            return RateLimitDecision::Allowed(None);
        }
        let rules = self.matching_rules(request);
        if rules.is_empty() {
            return RateLimitDecision::Allowed(None);
        }

        let Ok(mut counters) = self.counters.lock() else {
            error!("Rate limit counters are poisoned; allowing request");
            return RateLimitDecision::Allowed(None);
        };

        let keyed: Vec<(String, &RateLimitRule)> = rules
            .iter()
            .map(|rule| (self.counter_key(request, rule), *rule))
            .collect();

        let mut current = Vec::with_capacity(keyed.len());
        let mut blocked: Option<(&RateLimitRule, DateTime<Utc>)> = None;
        for (key, rule) in &keyed {
            let counter = match counters.get(key) {
                Some(counter) if window_end(counter.started, rule.period_span) > now => *counter,
                _ => Counter {
                    started: now,
                    count: 0,
                },
            };
            if blocked.is_none() && counter.count >= rule.limit {
                blocked = Some((*rule, window_end(counter.started, rule.period_span)));
            }
            current.push(counter);
        }

        if blocked.is_none() || self.options.stack_blocked_requests {
            for counter in &mut current {
                counter.count += 1;
            }
        }
        for ((key, _), counter) in keyed.iter().zip(&current) {
            counters.put(key.clone(), *counter);
        }

        if let Some((rule, window_end)) = blocked {
            let remaining_ms = (window_end - now).num_milliseconds().max(0) as u64;
            return RateLimitDecision::Blocked {
                rule: rule.clone(),
                retry_after_secs: remaining_ms.div_ceil(1000).max(1),
            };
        }

        let status = keyed
            .iter()
            .zip(&current)
            .map(|((_, rule), counter)| QuotaStatus {
                limit: rule.limit,
                remaining: rule.limit.saturating_sub(counter.count),
                reset: window_end(counter.started, rule.period_span),
            })
            .min_by(|a, b| a.remaining.cmp(&b.remaining).then(b.reset.cmp(&a.reset)));
        RateLimitDecision::Allowed(status)
    }

    /// Message sent with a blocked response.
    pub fn quota_exceeded_message(&self, rule: &RateLimitRule) -> String {
        match &self.options.quota_exceeded_message {
            Some(message) => message.clone(),
            None => format!(
                "API calls quota exceeded! maximum admitted {} per {}.",
                rule.limit, rule.period
            ),
        }
    }

    /// Client address: the real-IP header, then the first
    /// `X-Forwarded-For` hop, then the peer address.
    pub fn resolve_client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        header_value(&self.options.real_ip_header)
            .or_else(|| header_value(FORWARDED_FOR))
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }

    fn is_whitelisted(&self, request: &ClientRequest) -> bool {
        self.options
            .ip_whitelist
            .iter()
            .any(|ip| ip.trim() == request.client_ip)
            || self
                .options
                .endpoint_whitelist
                .iter()
                .any(|pattern| endpoint_matches(pattern, &request.method, &request.path))
    }

    /// Applicable rules, keeping the lowest limit per period.
    fn matching_rules(&self, request: &ClientRequest) -> Vec<&RateLimitRule> {
        let mut rules: Vec<&RateLimitRule> = Vec::new();
        for rule in &self.options.general_rules {
            let applies = if self.options.enable_endpoint_rate_limiting {
                endpoint_matches(&rule.endpoint, &request.method, &request.path)
            } else {
                rule.is_global()
            };
            if !applies {
                continue;
            }
            match rules
                .iter_mut()
                .find(|existing| existing.period_span == rule.period_span)
            {
                Some(existing) if existing.limit > rule.limit => *existing = rule,
                Some(_) => {}
                None => rules.push(rule),
            }
        }
        rules.sort_by_key(|rule| rule.period_span);
        rules
    }

    fn counter_key(&self, request: &ClientRequest, rule: &RateLimitRule) -> String {
        if self.options.enable_endpoint_rate_limiting {
            format!(
                "{}|{}|{}",
                request.client_ip,
                request.endpoint(),
                rule.period
            )
        } else {
            format!("{}|*|{}", request.client_ip, rule.period)
        }
    }
}

/// Axum middleware enforcing [`IpRateLimiter`] quotas.
pub async fn rate_limit(
    State(limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = ClientRequest::new(
        limiter.resolve_client_ip(request.headers(), peer),
        request.method().as_str(),
        request.uri().path(),
    );

    match limiter.check(&client) {
        RateLimitDecision::Allowed(status) => {
            let mut response = next.run(request).await;
            if let Some(status) = status {
                let headers = response.headers_mut();
                insert_header(headers, X_RATE_LIMIT_LIMIT, &status.limit.to_string());
                insert_header(headers, X_RATE_LIMIT_REMAINING, &status.remaining.to_string());
                insert_header(
                    headers,
                    X_RATE_LIMIT_RESET,
                    &status.reset.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            response
        }
        RateLimitDecision::Blocked {
            rule,
            retry_after_secs,
        } => {
            info!(
                client_ip = %client.client_ip,
                endpoint = %client.endpoint(),
                rule = %rule.endpoint,
                period = %rule.period,
                limit = rule.limit,
                "Request blocked by rate limit"
            );
            let message = limiter.quota_exceeded_message(&rule);
            let mut response = (limiter.options.http_status_code, message).into_response();
            insert_header(
                response.headers_mut(),
                "retry-after",
                &retry_after_secs.to_string(),
            );
            response
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
