// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `DataConverter` — payload (de)serialization, deliberately kept outside
//! the worker core per spec §1. `worker-bridge` ships one default
//! implementation, `JsonDataConverter`; the real converter is out of scope.

use crate::error::ConverterError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Converts between typed values and the opaque payload bytes carried on
/// activations, tasks, and completions.
///
/// Async uniformly: spec §9 resolves the source's sync/async inconsistency
/// in favor of async for every payload operation.
#[async_trait]
pub trait DataConverter: Clone + Send + Sync + 'static {
    async fn encode<T: Serialize + Send + Sync>(&self, value: &T) -> Result<Vec<u8>, ConverterError>;
    async fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ConverterError>;
}

/// Default converter: payload bytes are JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDataConverter;

#[async_trait]
impl DataConverter for JsonDataConverter {
    async fn encode<T: Serialize + Send + Sync>(&self, value: &T) -> Result<Vec<u8>, ConverterError> {
        serde_json::to_vec(value).map_err(|e| ConverterError::Encode(e.to_string()))
    }

    async fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ConverterError> {
        serde_json::from_slice(bytes).map_err(|e| ConverterError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[tokio::test]
    async fn json_converter_round_trips() {
        let converter = JsonDataConverter;
        let encoded = converter.encode(&Sample { value: 42 }).await.expect("encode");
        let decoded: Sample = converter.decode(&encoded).await.expect("decode");
        assert_eq!(decoded, Sample { value: 42 });
    }

    #[tokio::test]
    async fn json_converter_reports_decode_errors() {
        let converter = JsonDataConverter;
        let err = converter.decode::<Sample>(b"not json").await.unwrap_err();
        assert!(matches!(err, ConverterError::Decode(_)));
    }
}
