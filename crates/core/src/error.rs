use thiserror::Error;

use crate::media::MediaId;

#[derive(Error, Debug)]
pub enum SieveError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The injected comparator failed for a specific pair. Fatal for the
    /// whole invocation: a skipped comparison would silently break the
    /// clustering contract.
    #[error("comparator failed for pair {a}/{b}")]
    Comparator {
        a: MediaId,
        b: MediaId,
        #[source]
        source: anyhow::Error,
    },

    #[error("grouping cancelled")]
    Cancelled,

    #[error("clustering task failed: {0}")]
    TaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn comparator_error_names_the_pair() {
        let err = SieveError::Comparator {
            a: Uuid::from_u128(1),
            b: Uuid::from_u128(2),
            source: anyhow::anyhow!("decode failure"),
        };
        let msg = err.to_string();
        assert!(msg.contains("00000000-0000-0000-0000-000000000001"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000002"));
    }
}
