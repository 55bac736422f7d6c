/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Serialization helpers for messages and task payloads.
//!
//! Everything that crosses the wire in taskgraph_rs is serialized with [borsh](borsh). Task payloads
//! are opaque to the framework, but tasks are free to use these helpers to encode and decode them too.

use std::{
    any::Any,
    fmt::{self, Display, Formatter},
    panic::{self, AssertUnwindSafe},
};

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

/// Serialize `value` into bytes.
///
/// borsh refuses to serialize NaN floats by panicking rather than by returning an error. That refusal is
/// reported here as a [`CodecError::Encode`] like any other encoding failure.
pub fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    match panic::catch_unwind(AssertUnwindSafe(|| value.try_to_vec())) {
        Ok(result) => result.map_err(|err| CodecError::Encode(err.to_string())),
        Err(panic) => Err(CodecError::Encode(panic_reason(panic.as_ref()))),
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.clone()
    } else {
        String::from("serializer panicked")
    }
}

/// Deserialize a `T` from `bytes`. Fails if `bytes` holds trailing data.
pub fn decode<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, CodecError> {
    T::try_from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}

/// Compute the SHA256 digest of a payload. Used to identify payloads in logs without printing them.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    Encode(String),
    Decode(String),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(reason) => write!(f, "failed to encode: {}", reason),
            CodecError::Decode(reason) => write!(f, "failed to decode: {}", reason),
        }
    }
}
