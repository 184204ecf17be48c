use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use loadphase_metrics::Outcome;

use crate::Error;
use crate::executor::Exchange;

/// Per-response assertion recorded as a pass/fail counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// The response classified as something other than failure.
    ExpectedStatus,
    /// A status arrived and it was below 500.
    NoServerError,
    LatencyBelow(Duration),
}

impl Check {
    #[must_use]
    pub fn evaluate(&self, exchange: &Exchange, outcome: Outcome) -> bool {
        match self {
            Self::ExpectedStatus => !outcome.is_failure(),
            Self::NoServerError => exchange.status.is_some_and(|s| s < 500),
            Self::LatencyBelow(budget) => exchange.error.is_none() && exchange.latency < *budget,
        }
    }
}

impl FromStr for Check {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        match s.as_str() {
            "expected_status" => Ok(Self::ExpectedStatus),
            "no_server_error" => Ok(Self::NoServerError),
            _ => {
                let budget = s
                    .strip_prefix("latency<")
                    .and_then(|d| humantime::parse_duration(d).ok())
                    .filter(|d| !d.is_zero())
                    .ok_or_else(|| Error::InvalidCheck(raw.to_string()))?;
                Ok(Self::LatencyBelow(budget))
            }
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedStatus => f.write_str("expected_status"),
            Self::NoServerError => f.write_str("no_server_error"),
            Self::LatencyBelow(d) => write!(f, "latency<{}", humantime::format_duration(*d)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ErrorKind;

    fn parse(s: &str) -> Check {
        s.parse().unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn parses_and_displays() {
        assert_eq!(parse("expected_status"), Check::ExpectedStatus);
        assert_eq!(parse(" no_server_error "), Check::NoServerError);
        let latency = parse("latency < 200ms");
        assert_eq!(latency, Check::LatencyBelow(Duration::from_millis(200)));
        assert_eq!(latency.to_string(), "latency<200ms");

        assert!("latency<0ms".parse::<Check>().is_err());
        assert!("status_is_ok".parse::<Check>().is_err());
    }

    #[test]
    fn evaluates_against_exchanges() {
        let fast_503 = Exchange::status(503, Duration::from_millis(10));
        assert!(!Check::ExpectedStatus.evaluate(&fast_503, Outcome::Failure));
        assert!(!Check::NoServerError.evaluate(&fast_503, Outcome::Failure));
        assert!(Check::LatencyBelow(Duration::from_millis(200)).evaluate(&fast_503, Outcome::Failure));

        let slow_409 = Exchange::status(409, Duration::from_millis(250));
        assert!(Check::ExpectedStatus.evaluate(&slow_409, Outcome::Conflict));
        assert!(Check::NoServerError.evaluate(&slow_409, Outcome::Conflict));
        assert!(!Check::LatencyBelow(Duration::from_millis(200)).evaluate(&slow_409, Outcome::Conflict));

        let timeout = Exchange::error(ErrorKind::Timeout, Duration::from_millis(1));
        assert!(!Check::NoServerError.evaluate(&timeout, Outcome::Failure));
        assert!(!Check::LatencyBelow(Duration::from_secs(1)).evaluate(&timeout, Outcome::Failure));
    }
}
