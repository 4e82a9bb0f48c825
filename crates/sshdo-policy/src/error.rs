use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("pattern error in {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },
}

pub type PolicyResult<T> = Result<T, PolicyError>;
