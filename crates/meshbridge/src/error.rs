//! Bridge error taxonomy.

/// Errors returned by control-plane operations.
///
/// Packet-path problems (malformed frames, protocol mismatches) are never
/// surfaced through this type; the offending frame is dropped and a counter
/// incremented instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Malformed address, out-of-range parameter, duplicate tunnel peer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown port, group, or FDB key on a query.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflicting structural operation is in progress.
    #[error("busy: {0}")]
    Busy(String),

    /// Table capacity exhausted while creating an entry.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Malformed BPDU or tunnel frame.
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// Result type for control-plane operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = BridgeError::InvalidArgument("hello time out of range".to_string());
        assert_eq!(err.to_string(), "invalid argument: hello time out of range");
    }

    #[test]
    fn test_variants_are_distinguishable() {
        let err = BridgeError::NotFound("port 7".to_string());
        assert!(matches!(err, BridgeError::NotFound(_)));
        assert!(!matches!(err, BridgeError::Busy(_)));
    }
}
