/// Business-level classification of one completed request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Outcome {
    /// The resource was issued.
    Success,
    /// The identity already applied.
    Conflict,
    /// The resource pool is empty.
    Exhausted,
    /// Transport error, timeout, 5xx or a status outside the expected set.
    Failure,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Success,
        Outcome::Conflict,
        Outcome::Exhausted,
        Outcome::Failure,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Outcome::Success => 0,
            Outcome::Conflict => 1,
            Outcome::Exhausted => 2,
            Outcome::Failure => 3,
        }
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Failure)
    }
}

/// Why a request ended up as [`Outcome::Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureCause {
    Transport,
    Timeout,
    ServerError,
    UnexpectedStatus,
    /// Timed out by the graceful stop rather than the request timeout: still in flight
    /// when the run ended and the stop window closed. Latency runs up to that moment.
    Abandoned,
}

impl FailureCause {
    pub const ALL: [FailureCause; 5] = [
        FailureCause::Transport,
        FailureCause::Timeout,
        FailureCause::ServerError,
        FailureCause::UnexpectedStatus,
        FailureCause::Abandoned,
    ];

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            FailureCause::Transport => 0,
            FailureCause::Timeout => 1,
            FailureCause::ServerError => 2,
            FailureCause::UnexpectedStatus => 3,
            FailureCause::Abandoned => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parses_case_insensitively() {
        assert_eq!("success".parse::<Outcome>().ok(), Some(Outcome::Success));
        assert_eq!("Conflict".parse::<Outcome>().ok(), Some(Outcome::Conflict));
        assert!("issued".parse::<Outcome>().is_err());
    }

    #[test]
    fn indices_match_all_order() {
        for (i, o) in Outcome::ALL.iter().enumerate() {
            assert_eq!(o.index(), i);
        }
        for (i, c) in FailureCause::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn causes_render_snake_case() {
        assert_eq!(FailureCause::ServerError.to_string(), "server_error");
        assert_eq!(FailureCause::UnexpectedStatus.to_string(), "unexpected_status");
    }
}
