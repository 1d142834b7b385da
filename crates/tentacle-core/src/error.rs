use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Registration validation
    #[error("the requested version {version} is not supported, supported versions are {supported:?}")]
    UnsupportedVersion {
        version: String,
        supported: &'static [&'static str],
    },

    #[error("the requested name {name} is not qualified: {reason}")]
    UnqualifiedName { name: String, reason: String },

    #[error("the requested endpoint {0} could not be recognized")]
    UnrecognizedEndpoint(String),

    // Device link identity
    #[error("Invalid device link: {0}")]
    InvalidLink(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for errors raised while validating caller input.
    ///
    /// The registration service maps these to an invalid-argument status.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_version_display() {
        let error = Error::UnsupportedVersion {
            version: "v2".to_string(),
            supported: &["v1alpha1"],
        };
        assert_eq!(
            error.to_string(),
            "the requested version v2 is not supported, supported versions are [\"v1alpha1\"]"
        );
        assert!(error.is_invalid_argument());
    }

    #[test]
    fn test_io_is_not_invalid_argument() {
        let error = Error::from(std::io::Error::other("disk gone"));
        assert!(!error.is_invalid_argument());
    }
}
