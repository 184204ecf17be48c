use std::collections::BTreeMap;

use loadphase_metrics::{FailureCause, Outcome};

use crate::executor::{ErrorKind, Exchange};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    /// Set exactly when `outcome` is [`Outcome::Failure`].
    pub cause: Option<FailureCause>,
}

impl Classification {
    fn ok(outcome: Outcome) -> Self {
        Self {
            outcome,
            cause: None,
        }
    }

    fn failure(cause: FailureCause) -> Self {
        Self {
            outcome: Outcome::Failure,
            cause: Some(cause),
        }
    }
}

/// Maps raw exchanges onto business outcomes using the expected-status set.
///
/// Statuses missing from the set are failures: 5xx as server errors, anything else as
/// unexpected statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    expected: BTreeMap<u16, Outcome>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            expected: BTreeMap::from([
                (200, Outcome::Success),
                (409, Outcome::Conflict),
                (422, Outcome::Exhausted),
            ]),
        }
    }
}

impl Classifier {
    pub fn new(mapping: impl IntoIterator<Item = (u16, Outcome)>) -> Result<Self> {
        let mut expected = BTreeMap::new();
        for (status, outcome) in mapping {
            if !(100..=599).contains(&status) {
                return Err(Error::InvalidStatusMapping(format!(
                    "{status} is not an HTTP status code"
                )));
            }
            if status >= 500 {
                return Err(Error::InvalidStatusMapping(format!(
                    "{status} is a server error and always counts as failure"
                )));
            }
            if outcome.is_failure() {
                return Err(Error::InvalidStatusMapping(format!(
                    "{status}: unlisted statuses already count as failure"
                )));
            }
            if expected.insert(status, outcome).is_some() {
                return Err(Error::InvalidStatusMapping(format!(
                    "{status} is mapped twice"
                )));
            }
        }

        if expected.is_empty() {
            return Err(Error::InvalidStatusMapping(
                "at least one expected status is required".to_string(),
            ));
        }

        Ok(Self { expected })
    }

    pub fn expected(&self) -> impl Iterator<Item = (u16, Outcome)> + '_ {
        self.expected.iter().map(|(s, o)| (*s, *o))
    }

    #[must_use]
    pub fn classify(&self, exchange: &Exchange) -> Classification {
        if let Some(kind) = exchange.error {
            return Classification::failure(match kind {
                ErrorKind::Timeout => FailureCause::Timeout,
                ErrorKind::Connect | ErrorKind::Transport => FailureCause::Transport,
            });
        }

        match exchange.status {
            Some(status) => match self.expected.get(&status) {
                Some(outcome) => Classification::ok(*outcome),
                None if status >= 500 => Classification::failure(FailureCause::ServerError),
                None => Classification::failure(FailureCause::UnexpectedStatus),
            },
            None => Classification::failure(FailureCause::Transport),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(code: u16) -> Exchange {
        Exchange::status(code, Duration::from_millis(5))
    }

    #[test]
    fn default_mapping_follows_business_vocabulary() {
        let c = Classifier::default();
        assert_eq!(c.classify(&status(200)).outcome, Outcome::Success);
        assert_eq!(c.classify(&status(409)).outcome, Outcome::Conflict);
        assert_eq!(c.classify(&status(422)).outcome, Outcome::Exhausted);

        let unavailable = c.classify(&status(503));
        assert_eq!(unavailable.outcome, Outcome::Failure);
        assert_eq!(unavailable.cause, Some(FailureCause::ServerError));

        let refused = c.classify(&Exchange::error(
            ErrorKind::Connect,
            Duration::from_millis(1),
        ));
        assert_eq!(refused.outcome, Outcome::Failure);
        assert_eq!(refused.cause, Some(FailureCause::Transport));
    }

    #[test]
    fn unlisted_statuses_are_unexpected_failures() {
        let c = Classifier::default();
        for code in [201, 302, 400, 404] {
            let got = c.classify(&status(code));
            assert_eq!(got.outcome, Outcome::Failure, "status {code}");
            assert_eq!(got.cause, Some(FailureCause::UnexpectedStatus));
        }
    }

    #[test]
    fn timeouts_keep_their_cause() {
        let c = Classifier::default();
        let got = c.classify(&Exchange::error(ErrorKind::Timeout, Duration::from_secs(5)));
        assert_eq!(got.cause, Some(FailureCause::Timeout));
    }

    #[test]
    fn custom_vocabulary_replaces_defaults() {
        let c = Classifier::new([(201, Outcome::Success), (429, Outcome::Exhausted)])
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(c.classify(&status(201)).outcome, Outcome::Success);
        assert_eq!(c.classify(&status(429)).outcome, Outcome::Exhausted);
        assert_eq!(c.classify(&status(200)).outcome, Outcome::Failure);
    }

    #[test]
    fn rejects_invalid_mappings() {
        assert!(Classifier::new([(503, Outcome::Success)]).is_err());
        assert!(Classifier::new([(404, Outcome::Failure)]).is_err());
        assert!(Classifier::new([(42, Outcome::Success)]).is_err());
        assert!(Classifier::new([(200, Outcome::Success), (200, Outcome::Conflict)]).is_err());
        assert!(Classifier::new(Vec::<(u16, Outcome)>::new()).is_err());
    }
}
