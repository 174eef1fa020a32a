// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload codec between typed workflow values and stored JSON

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode payload: {0}")]
    Decode(#[source] serde_json::Error),
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, PayloadError> {
    serde_json::to_value(value).map_err(PayloadError::Encode)
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, PayloadError> {
    serde_json::from_value(value).map_err(PayloadError::Decode)
}
