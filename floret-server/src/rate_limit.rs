//! Per-client request limits, checked before the route handler runs.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_LIMITS: &str = "200 per day;50 per hour";
pub const ROUTE_LIMITS: &str = "10 per minute";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
}

impl Granularity {
    fn seconds(self) -> u64 {
        match self {
            Granularity::Second => 1,
            Granularity::Minute => 60,
            Granularity::Hour => 3_600,
            Granularity::Day => 86_400,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

impl FromStr for Granularity {
    type Err = LimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = s.trim().to_ascii_lowercase();
        match unit.trim_end_matches('s') {
            "second" => Ok(Granularity::Second),
            "minute" => Ok(Granularity::Minute),
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            _ => Err(LimitParseError::UnknownUnit(s.trim().to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitParseError {
    #[error("expected '<count> per [<multiple>] <unit>', got '{0}'")]
    Syntax(String),
    #[error("limit count must be a positive integer, got '{0}'")]
    Count(String),
    #[error("unknown time unit '{0}'")]
    UnknownUnit(String),
    #[error("no limits given")]
    Empty,
}

/// A single limit such as `10 per minute` or `50 per 2 hours`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSpec {
    pub count: NonZeroU32,
    pub multiple: NonZeroU32,
    pub granularity: Granularity,
}

impl LimitSpec {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.granularity.seconds() * u64::from(self.multiple.get()))
    }

    pub fn quota(&self) -> Quota {
        // The replenish interval only rounds to zero for counts above a billion per second.
        Quota::with_period(self.period() / self.count.get())
            .unwrap_or_else(|| Quota::per_second(self.count))
            .allow_burst(self.count)
    }
}

impl fmt::Display for LimitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} per {} {}",
            self.count,
            self.multiple,
            self.granularity.as_str()
        )
    }
}

fn positive(s: &str) -> Result<NonZeroU32, LimitParseError> {
    s.parse::<NonZeroU32>()
        .map_err(|_| LimitParseError::Count(s.to_string()))
}

impl FromStr for LimitSpec {
    type Err = LimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let (count, multiple, unit) = match words.as_slice() {
            [count, "per", unit] => (*count, None, *unit),
            [count, "per", multiple, unit] => (*count, Some(*multiple), *unit),
            _ => return Err(LimitParseError::Syntax(s.trim().to_string())),
        };
        Ok(Self {
            count: positive(count)?,
            multiple: multiple.map(positive).transpose()?.unwrap_or(NonZeroU32::MIN),
            granularity: unit.parse()?,
        })
    }
}

/// A `;`-separated list of limits, as accepted on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits(pub Vec<LimitSpec>);

impl FromStr for Limits {
    type Err = LimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let limits = s
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<LimitSpec>, _>>()?;
        if limits.is_empty() {
            return Err(LimitParseError::Empty);
        }
        Ok(Self(limits))
    }
}

/// A request that exceeded `limit`; the client may retry after `retry_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub limit: LimitSpec,
    pub retry_after: Duration,
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after.as_secs_f64().ceil().max(1.0) as u64;
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, retry_after.to_string())],
            format!("Too Many Requests: {}", self.limit),
        )
            .into_response()
    }
}

/// Decides whether a client may make another request.
pub trait ClientLimiter: Send + Sync {
    fn check(&self, client: IpAddr) -> Result<(), RateLimited>;
}

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// GCRA limiters keyed by client address, one per configured limit.
pub struct GovernorLimiter {
    limits: Vec<(LimitSpec, KeyedLimiter)>,
    clock: DefaultClock,
}

impl GovernorLimiter {
    pub fn new(limits: impl IntoIterator<Item = LimitSpec>) -> Self {
        let limits = limits
            .into_iter()
            .map(|spec| (spec, RateLimiter::keyed(spec.quota())))
            .collect();
        Self {
            limits,
            clock: DefaultClock::default(),
        }
    }

    pub fn limits(&self) -> impl Iterator<Item = &LimitSpec> {
        self.limits.iter().map(|(spec, _)| spec)
    }

    /// Drops state for clients whose limits have fully replenished.
    pub fn retain_recent(&self) {
        for (_, limiter) in &self.limits {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }
}

impl ClientLimiter for GovernorLimiter {
    fn check(&self, client: IpAddr) -> Result<(), RateLimited> {
        for (spec, limiter) in &self.limits {
            if let Err(not_until) = limiter.check_key(&client) {
                return Err(RateLimited {
                    limit: *spec,
                    retry_after: not_until.wait_time_from(self.clock.now()),
                });
            }
        }
        Ok(())
    }
}

fn client_ip(request: &Request) -> IpAddr {
    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip(),
        None => {
            debug!("no peer address on request, limiting as unspecified");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}

pub async fn enforce_rate_limit(
    State(limiter): State<Arc<dyn ClientLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request);
    match limiter.check(client) {
        Ok(()) => next.run(request).await,
        Err(limited) => {
            warn!(%client, limit = %limited.limit, "rate limit exceeded");
            limited.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> LimitSpec {
        s.parse().unwrap()
    }

    #[test]
    fn parses_limit_strings() {
        let limit = spec("10 per minute");
        assert_eq!(limit.count.get(), 10);
        assert_eq!(limit.period(), Duration::from_secs(60));
        assert_eq!(spec("50 per 2 hours").period(), Duration::from_secs(7_200));
        assert_eq!(spec("200 per Day").granularity, Granularity::Day);
    }

    #[test]
    fn rejects_bad_limit_strings() {
        assert!(matches!(
            "ten per minute".parse::<LimitSpec>(),
            Err(LimitParseError::Count(_))
        ));
        assert!(matches!(
            "0 per minute".parse::<LimitSpec>(),
            Err(LimitParseError::Count(_))
        ));
        assert!(matches!(
            "10 per fortnight".parse::<LimitSpec>(),
            Err(LimitParseError::UnknownUnit(_))
        ));
        assert!(matches!(
            "10/minute".parse::<LimitSpec>(),
            Err(LimitParseError::Syntax(_))
        ));
        assert_eq!(" ; ".parse::<Limits>(), Err(LimitParseError::Empty));
    }

    #[test]
    fn parses_default_limit_list() {
        let Limits(limits) = DEFAULT_LIMITS.parse().unwrap();
        assert_eq!(limits, vec![spec("200 per day"), spec("50 per hour")]);
    }

    #[test]
    fn displays_like_the_rejection_message() {
        assert_eq!(spec("10 per minute").to_string(), "10 per 1 minute");
    }

    fn retry_after_header(retry_after: Duration) -> String {
        let response = RateLimited {
            limit: spec("10 per minute"),
            retry_after,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        response.headers()[RETRY_AFTER].to_str().unwrap().to_string()
    }

    #[test]
    fn retry_after_is_whole_seconds_and_at_least_one() {
        assert_eq!(retry_after_header(Duration::ZERO), "1");
        assert_eq!(retry_after_header(Duration::from_millis(200)), "1");
        assert_eq!(retry_after_header(Duration::from_millis(2_500)), "3");
        assert_eq!(retry_after_header(Duration::from_secs(6)), "6");
    }

    #[test]
    fn limits_each_client_separately() {
        let limiter = GovernorLimiter::new([spec("2 per minute")]);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a).is_ok());
        assert!(limiter.check(a).is_ok());
        let limited = limiter.check(a).unwrap_err();
        assert_eq!(limited.limit, spec("2 per minute"));
        assert!(limited.retry_after > Duration::ZERO);
        assert!(limited.retry_after <= Duration::from_secs(30));

        assert!(limiter.check(b).is_ok());
    }

    #[test]
    fn tightest_exhausted_limit_is_reported() {
        let limiter = GovernorLimiter::new([spec("5 per hour"), spec("1 per minute")]);
        let client: IpAddr = "192.168.1.9".parse().unwrap();

        assert!(limiter.check(client).is_ok());
        assert_eq!(
            limiter.check(client).unwrap_err().limit,
            spec("1 per minute")
        );
        limiter.retain_recent();
        assert_eq!(limiter.limits().count(), 2);
    }
}
