// Path: crates/types/src/error/mod.rs
//! Core error types for Switchboard.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// The top-level error taxonomy of the governance core.
///
/// Variants map one-to-one onto the HTTP statuses the frontends surface, via
/// [`CoreError::http_status`]. Frontends must not invent additional mappings.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input: unknown enum value, bad body, invalid parameters.
    #[error("validation failed: {0}")]
    Validation(String),
    /// No such principal, envelope, approval, or cartridge.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up.
        entity: &'static str,
        /// The id that failed to resolve.
        id: String,
    },
    /// Ambiguous entity resolution; the caller must answer a question.
    #[error("needs clarification: {question}")]
    NeedsClarification {
        /// The question to put to the caller.
        question: String,
        /// Candidate entities the caller can pick from.
        alternatives: Vec<serde_json::Value>,
    },
    /// The authenticated principal does not match the claimed one, or the
    /// organization scope does not line up.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Optimistic-lock conflict on an approval or envelope mutation.
    #[error("stale version: expected {expected}, found {found}")]
    StaleVersion {
        /// The version the caller supplied.
        expected: u64,
        /// The version currently persisted.
        found: u64,
    },
    /// The responder's binding hash does not match the frozen parameters.
    /// The message is stable; callers match on it.
    #[error("binding hash does not match current parameters; approval is stale")]
    BindingHashMismatch,
    /// The caller exceeded an ingress or outbound rate limit.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// A network or timeout failure from a cartridge. Retried by the guard;
    /// escalated to `Fatal`-free failure after the retry budget is spent.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Programmer error or contract violation. Surfaced as a sanitized 500.
    #[error("internal error: {0}")]
    Fatal(String),
}

impl CoreError {
    /// The HTTP status a frontend surfaces for this error kind.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::NeedsClarification { .. } => 422,
            Self::Forbidden(_) => 403,
            Self::StaleVersion { .. } => 409,
            Self::BindingHashMismatch => 400,
            Self::RateLimited(_) => 429,
            Self::Transient(_) => 502,
            Self::Fatal(_) => 500,
        }
    }

    /// Convenience constructor for a missing entity.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::NeedsClarification { .. } => "NEEDS_CLARIFICATION",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::StaleVersion { .. } => "STALE_VERSION",
            Self::BindingHashMismatch => "BINDING_HASH_MISMATCH",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Transient(_) => "TRANSIENT_FAILURE",
            Self::Fatal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Errors raised while canonicalizing or hashing a value.
#[derive(Debug, Error)]
pub enum CanonicalError {
    /// The value could not be rendered as canonical JSON.
    #[error("canonical serialization failed: {0}")]
    Serialize(String),
}

impl ErrorCode for CanonicalError {
    fn code(&self) -> &'static str {
        match self {
            Self::Serialize(_) => "CANONICAL_SERIALIZE_FAILED",
        }
    }
}

impl From<CanonicalError> for CoreError {
    fn from(e: CanonicalError) -> Self {
        // A value that cannot be canonicalized is a contract violation, not
        // caller input.
        CoreError::Fatal(e.to_string())
    }
}

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A generic error originating from the underlying backend.
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested key or item was not found in the store.
    #[error("not found")]
    NotFound,
    /// A versioned write lost an optimistic-concurrency race.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// The version the writer expected to replace.
        expected: u64,
        /// The version actually persisted.
        found: u64,
    },
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Encode(_) => "STORE_ENCODE_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
            Self::NotFound => "STORE_NOT_FOUND",
            Self::VersionConflict { .. } => "STORE_VERSION_CONFLICT",
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => CoreError::not_found("record", "<unknown>"),
            StoreError::VersionConflict { expected, found } => {
                CoreError::StaleVersion { expected, found }
            }
            other => CoreError::Fatal(other.to_string()),
        }
    }
}

/// Errors raised by a cartridge during entity resolution, enrichment, or
/// execution. The guard classifies these to decide retry behavior.
#[derive(Debug, Error)]
pub enum CartridgeError {
    /// A network or timeout failure that is safe to retry.
    #[error("transient: {0}")]
    Transient(String),
    /// The upstream service asked the caller to back off.
    #[error("rate limited by upstream")]
    RateLimited {
        /// Retry-after hint from the upstream, when provided.
        retry_after_ms: Option<i64>,
    },
    /// The target entity does not exist in the external system.
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    /// The cartridge does not support the requested action.
    #[error("unsupported action: {0}")]
    Unsupported(String),
    /// A permanent failure; retrying will not help.
    #[error("execution failed: {0}")]
    Failed(String),
}

impl CartridgeError {
    /// Whether the retry interceptor may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }
}

impl ErrorCode for CartridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transient(_) => "CARTRIDGE_TRANSIENT",
            Self::RateLimited { .. } => "CARTRIDGE_RATE_LIMITED",
            Self::EntityNotFound(_) => "CARTRIDGE_ENTITY_NOT_FOUND",
            Self::Unsupported(_) => "CARTRIDGE_UNSUPPORTED",
            Self::Failed(_) => "CARTRIDGE_FAILED",
        }
    }
}

impl From<CartridgeError> for CoreError {
    fn from(e: CartridgeError) -> Self {
        match e {
            CartridgeError::Transient(m) => CoreError::Transient(m),
            CartridgeError::RateLimited { .. } => {
                CoreError::Transient("rate limited by upstream".into())
            }
            CartridgeError::EntityNotFound(id) => CoreError::not_found("entity", id),
            CartridgeError::Unsupported(m) => CoreError::Validation(m),
            CartridgeError::Failed(m) => CoreError::Fatal(m),
        }
    }
}

/// Errors raised by the cartridge registry on registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The manifest version is not valid semver.
    #[error("invalid semver '{version}' for cartridge '{id}': {reason}")]
    InvalidVersion {
        /// The cartridge id being registered.
        id: String,
        /// The offending version string.
        version: String,
        /// Parser detail.
        reason: String,
    },
    /// Registering the same version twice is rejected.
    #[error("cartridge '{id}' version {version} is already registered")]
    DuplicateVersion {
        /// The cartridge id being registered.
        id: String,
        /// The rejected version.
        version: String,
    },
    /// Registering a lower version than the current one is rejected.
    #[error("cartridge '{id}' downgrade {existing} -> {offered} rejected")]
    Downgrade {
        /// The cartridge id being registered.
        id: String,
        /// The currently registered version.
        existing: String,
        /// The lower version that was offered.
        offered: String,
    },
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidVersion { .. } => "REGISTRY_INVALID_VERSION",
            Self::DuplicateVersion { .. } => "REGISTRY_DUPLICATE_VERSION",
            Self::Downgrade { .. } => "REGISTRY_DOWNGRADE",
        }
    }
}

impl From<RegistryError> for CoreError {
    fn from(e: RegistryError) -> Self {
        CoreError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_is_stable() {
        assert_eq!(CoreError::Validation("x".into()).http_status(), 400);
        assert_eq!(CoreError::not_found("envelope", "e1").http_status(), 404);
        assert_eq!(
            CoreError::NeedsClarification {
                question: "which campaign?".into(),
                alternatives: vec![],
            }
            .http_status(),
            422
        );
        assert_eq!(CoreError::Forbidden("x".into()).http_status(), 403);
        assert_eq!(
            CoreError::StaleVersion {
                expected: 1,
                found: 2
            }
            .http_status(),
            409
        );
        assert_eq!(CoreError::BindingHashMismatch.http_status(), 400);
        assert_eq!(CoreError::RateLimited("x".into()).http_status(), 429);
    }

    #[test]
    fn binding_mismatch_message_mentions_stale() {
        let msg = CoreError::BindingHashMismatch.to_string();
        assert!(msg.contains("stale"));
    }

    #[test]
    fn store_conflict_converts_to_stale_version() {
        let e: CoreError = StoreError::VersionConflict {
            expected: 3,
            found: 4,
        }
        .into();
        assert_eq!(e.code(), "STALE_VERSION");
    }
}
