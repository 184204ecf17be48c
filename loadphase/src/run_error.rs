use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Configuration errors are the user's to fix; anything else is ours.
    pub(crate) fn from_core(context: &'static str, err: loadphase_core::Error) -> Self {
        if err.is_configuration() {
            Self::InvalidInput(anyhow::Error::new(err).context(context))
        } else {
            Self::RuntimeError(anyhow::Error::new(err).context(context))
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_map_to_invalid_input() {
        let err = RunError::from_core("invalid run configuration", loadphase_core::Error::EmptyStages);
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().starts_with("invalid run configuration: "));
    }
}
