#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The backing store is unreachable or refused the operation. Fatal to
    /// the calling operation; never swallowed.
    #[error("Broker backend unavailable: {0}")]
    Unavailable(String),

    /// A queue entry, record, or event could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for BrokerError {
    fn from(err: ::redis::RedisError) -> Self {
        BrokerError::Unavailable(err.to_string())
    }
}
