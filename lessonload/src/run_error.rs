use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    SetupFailed(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::SetupFailed(_) => ExitCode::SetupFailed,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::SetupFailed(e) | Self::RuntimeError(e) => e,
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

impl From<lessonload_core::Error> for RunError {
    fn from(err: lessonload_core::Error) -> Self {
        use lessonload_core::Error;
        match err {
            Error::Setup(_) => Self::SetupFailed(err.into()),
            Error::InvalidStages | Error::InvalidVus | Error::InvalidThreshold { .. } => {
                Self::InvalidInput(err.into())
            }
            _ => Self::RuntimeError(err.into()),
        }
    }
}

impl From<lessonload_report::Error> for RunError {
    fn from(err: lessonload_report::Error) -> Self {
        use lessonload_report::Error;
        match err {
            Error::Read { .. } | Error::Threshold(_) => Self::InvalidInput(err.into()),
            _ => Self::RuntimeError(err.into()),
        }
    }
}
