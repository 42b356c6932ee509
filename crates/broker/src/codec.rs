//! JSON text-blob codec for everything the broker moves.
//!
//! One descriptor, record, or event is exactly one JSON text blob. Queue
//! entries, store values, and channel payloads all share this encoding, so
//! any component (or a human with redis-cli) can read any of them.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BrokerError;

pub fn encode<T: Serialize>(value: &T) -> Result<String, BrokerError> {
    Ok(serde_json::to_string(value)?)
}

pub fn decode<T: DeserializeOwned>(blob: &str) -> Result<T, BrokerError> {
    Ok(serde_json::from_str(blob)?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use parallax_core::job::JobDescriptor;
    use parallax_core::types::JobId;

    use super::*;
    use crate::error::BrokerError;

    #[test]
    fn descriptor_survives_a_blob_round_trip() {
        let d = JobDescriptor::first_stage(JobId::from("j-1"), "/uploads/a.mp4", 3);
        let blob = encode(&d).unwrap();
        let back: JobDescriptor = decode(&blob).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn malformed_blob_is_a_codec_error() {
        let err = decode::<JobDescriptor>("{not json").unwrap_err();
        assert_matches!(err, BrokerError::Codec(_));
    }
}
