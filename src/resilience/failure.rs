//! Errors raised by external collaborators (capability providers and event
//! handlers) before the core has classified them.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    /// The collaborator says a retry may succeed
    #[error("{0}")]
    Transient(String),
    /// The collaborator says a retry cannot succeed (auth, permission, bad input)
    #[error("{0}")]
    Critical(String),
    /// No hint given; the classifier decides from the message
    #[error("{0}")]
    Unclassified(String),
}

impl ExternalError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::Critical(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Critical(msg) | Self::Unclassified(msg) => msg,
        }
    }
}

impl From<anyhow::Error> for ExternalError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ExternalError>() {
            Ok(external) => external,
            Err(other) => ExternalError::Unclassified(format!("{other:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_preserves_explicit_classification() {
        let err: anyhow::Error = ExternalError::critical("token revoked").into();
        assert_eq!(ExternalError::from(err), ExternalError::critical("token revoked"));
    }

    #[test]
    fn test_anyhow_context_is_kept_in_message() {
        let err = anyhow::anyhow!("connection reset").context("uploading video");
        let external = ExternalError::from(err);
        assert_eq!(
            external,
            ExternalError::Unclassified("uploading video: connection reset".to_string())
        );
    }
}
