//! Error types for the Doris operator
//!
//! Errors raised inside a reconciliation pass abort the current stage; the
//! pipeline never inspects their content. [`MultiError`] and [`TaggedErrors`]
//! combine independent failures for code paths that must attempt every
//! operation before reporting.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Main error type for Doris operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Validation failures collected across several roles
    #[error("validation error: {0}")]
    InvalidSpec(TaggedErrors),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "object-store", "status")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec change. Kubernetes
    /// 4xx errors other than conflicts are treated as permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(ae)) => ae.code == 409 || !(400..500).contains(&ae.code),
            Error::Kube(_) => true,
            Error::Validation(_) | Error::InvalidSpec(_) | Error::Serialization(_) => false,
            Error::Internal { .. } => true,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// Error aggregation
// =============================================================================

/// An ordered list of independent errors
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    /// Merge the given results' errors, returning `None` if none failed
    pub fn merge<I>(results: I) -> Option<Self>
    where
        I: IntoIterator<Item = std::result::Result<(), Error>>,
    {
        let errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// The collected errors in the order they were merged
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for MultiError {}

/// Errors keyed by the source that produced them
///
/// Tags are kept sorted so the rendered message is stable across passes.
#[derive(Debug, Default)]
pub struct TaggedErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl TaggedErrors {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure under `tag`
    pub fn push(&mut self, tag: impl Into<String>, msg: impl Into<String>) {
        self.errors.entry(tag.into()).or_default().push(msg.into());
    }

    /// Record the error of `result` under `tag`, if any
    pub fn record<T, E: fmt::Display>(&mut self, tag: &str, result: std::result::Result<T, E>) {
        if let Err(e) = result {
            self.push(tag, e.to_string());
        }
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages recorded under `tag`
    pub fn get(&self, tag: &str) -> Option<&[String]> {
        self.errors.get(tag).map(Vec::as_slice)
    }

    /// Convert into `Ok(())` when empty, otherwise an [`Error::InvalidSpec`]
    pub fn into_result(self) -> crate::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidSpec(self))
        }
    }
}

impl fmt::Display for TaggedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .flat_map(|(tag, msgs)| msgs.iter().map(move |m| format!("[{}] {}", tag, m)))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: validation errors require a spec change and are never retried
    #[test]
    fn story_validation_errors_are_permanent() {
        let err = Error::validation("fe.replicas must not be negative");
        assert!(err.to_string().contains("validation error"));
        assert!(!err.is_retryable());

        let err = Error::serialization("bad json");
        assert!(!err.is_retryable());
    }

    /// Story: internal errors surface their context in the message
    #[test]
    fn story_internal_errors_carry_context() {
        let err = Error::internal_with_context("object-store", "statefulset has no name");
        assert!(err.to_string().contains("[object-store]"));
        assert!(err.is_retryable());
    }

    #[test]
    fn merge_skips_successes() {
        let merged = MultiError::merge(vec![
            Ok(()),
            Err(Error::validation("first")),
            Ok(()),
            Err(Error::validation("second")),
        ])
        .unwrap();
        assert_eq!(merged.errors().len(), 2);
        assert_eq!(
            merged.to_string(),
            "validation error: first; validation error: second"
        );
    }

    #[test]
    fn merge_of_all_ok_is_none() {
        assert!(MultiError::merge(vec![Ok(()), Ok(())]).is_none());
        assert!(MultiError::merge(Vec::new()).is_none());
    }

    #[test]
    fn tagged_errors_render_sorted_by_tag() {
        let mut errs = TaggedErrors::new();
        errs.push("fe", "bad http_port");
        errs.push("be", "negative replicas");
        errs.push("fe", "bad query_port");
        assert_eq!(
            errs.to_string(),
            "[be] negative replicas; [fe] bad http_port; [fe] bad query_port"
        );
        assert_eq!(errs.get("fe").map(<[String]>::len), Some(2));
    }

    #[test]
    fn tagged_errors_into_result() {
        assert!(TaggedErrors::new().into_result().is_ok());

        let mut errs = TaggedErrors::new();
        errs.record("cn", "abc".parse::<u16>());
        errs.record("cn", "80".parse::<u16>());
        match errs.into_result() {
            Err(Error::InvalidSpec(tagged)) => assert_eq!(tagged.get("cn").unwrap().len(), 1),
            other => panic!("expected InvalidSpec, got {:?}", other),
        }
    }
}
