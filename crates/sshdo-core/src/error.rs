use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid escape sequence in {0:?}")]
    BadEscape(String),

    #[error("invalid principal {0:?}: {1}")]
    BadPrincipal(String, String),

    #[error("unknown syslog facility {0:?}")]
    UnknownFacility(String),

    #[error("unknown match style {0:?}")]
    UnknownMatchStyle(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
