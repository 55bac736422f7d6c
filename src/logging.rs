/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [config](crate::node::Configuration).
//!
//! taskgraph_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveDataResponse](crate::events::ReceiveDataResponseEvent) is printed:
//!
//! ```text
//! ReceiveDataResponse, 1701329264, 2, 4, Children, getD, fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the ID of the node that answered.
//! - The fourth value is the epoch the request was made in.
//! - The fifth and sixth values are the link kind and the method of the request.
//! - The seventh value is the first seven characters of the Base64 encoding of the SHA256 digest of
//!   the payload.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::{codec, events::*};

// Names of each event in PascalCase for printing:
pub const START_EPOCH: &str = "StartEpoch";
pub const ANNOUNCE_COMPLETION: &str = "AnnounceCompletion";
pub const RECEIVE_COMPLETION: &str = "ReceiveCompletion";
pub const ADVANCE_EPOCH: &str = "AdvanceEpoch";

pub const SEND_DATA_REQUEST: &str = "SendDataRequest";
pub const RECEIVE_DATA_RESPONSE: &str = "ReceiveDataResponse";
pub const DISCARD_DATA_RESPONSE: &str = "DiscardDataResponse";
pub const ABANDON_DATA_REQUEST: &str = "AbandonDataRequest";

pub const RECEIVE_DATA_REQUEST: &str = "ReceiveDataRequest";
pub const SEND_DATA_RESPONSE: &str = "SendDataResponse";
pub const ABANDON_SERVE: &str = "AbandonServe";

pub const RECEIVE_META: &str = "ReceiveMeta";

pub const FATAL: &str = "Fatal";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StartEpochEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_epoch_event: &StartEpochEvent| {
            log::info!(
                "{}, {}, {}",
                START_EPOCH,
                secs_since_unix_epoch(start_epoch_event.timestamp),
                start_epoch_event.epoch
            )
        };
        Box::new(logger)
    }
}

impl Logger for AnnounceCompletionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |announce_completion_event: &AnnounceCompletionEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ANNOUNCE_COMPLETION,
                secs_since_unix_epoch(announce_completion_event.timestamp),
                announce_completion_event.epoch,
                announce_completion_event.aggregator
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveCompletionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_completion_event: &ReceiveCompletionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_COMPLETION,
                secs_since_unix_epoch(receive_completion_event.timestamp),
                receive_completion_event.origin,
                receive_completion_event.epoch,
                receive_completion_event.announced
            )
        };
        Box::new(logger)
    }
}

impl Logger for AdvanceEpochEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |advance_epoch_event: &AdvanceEpochEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ADVANCE_EPOCH,
                secs_since_unix_epoch(advance_epoch_event.timestamp),
                advance_epoch_event.from,
                advance_epoch_event.to
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendDataRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_data_request_event: &SendDataRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                SEND_DATA_REQUEST,
                secs_since_unix_epoch(send_data_request_event.timestamp),
                send_data_request_event.target,
                send_data_request_event.epoch,
                send_data_request_event.link_kind,
                send_data_request_event.method,
                send_data_request_event.attempt
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveDataResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_data_response_event: &ReceiveDataResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                RECEIVE_DATA_RESPONSE,
                secs_since_unix_epoch(receive_data_response_event.timestamp),
                receive_data_response_event.origin,
                receive_data_response_event.epoch,
                receive_data_response_event.link_kind,
                receive_data_response_event.method,
                payload_digest(&receive_data_response_event.payload)
            )
        };
        Box::new(logger)
    }
}

impl Logger for DiscardDataResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |discard_data_response_event: &DiscardDataResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {:?}",
                DISCARD_DATA_RESPONSE,
                secs_since_unix_epoch(discard_data_response_event.timestamp),
                discard_data_response_event.origin,
                discard_data_response_event.epoch,
                discard_data_response_event.reason
            )
        };
        Box::new(logger)
    }
}

impl Logger for AbandonDataRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |abandon_data_request_event: &AbandonDataRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ABANDON_DATA_REQUEST,
                secs_since_unix_epoch(abandon_data_request_event.timestamp),
                abandon_data_request_event.target,
                abandon_data_request_event.epoch,
                abandon_data_request_event.method
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveDataRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_data_request_event: &ReceiveDataRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_DATA_REQUEST,
                secs_since_unix_epoch(receive_data_request_event.timestamp),
                receive_data_request_event.requester,
                receive_data_request_event.epoch,
                receive_data_request_event.link_kind,
                receive_data_request_event.method
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendDataResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_data_response_event: &SendDataResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                SEND_DATA_RESPONSE,
                secs_since_unix_epoch(send_data_response_event.timestamp),
                send_data_response_event.requester,
                send_data_response_event.epoch,
                send_data_response_event.method,
                payload_digest(&send_data_response_event.payload)
            )
        };
        Box::new(logger)
    }
}

impl Logger for AbandonServeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |abandon_serve_event: &AbandonServeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ABANDON_SERVE,
                secs_since_unix_epoch(abandon_serve_event.timestamp),
                abandon_serve_event.requester,
                abandon_serve_event.epoch,
                abandon_serve_event.method
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveMetaEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_meta_event: &ReceiveMetaEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_META,
                secs_since_unix_epoch(receive_meta_event.timestamp),
                receive_meta_event.origin,
                receive_meta_event.epoch,
                receive_meta_event.link_kind,
                receive_meta_event.meta
            )
        };
        Box::new(logger)
    }
}

impl Logger for FatalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |fatal_event: &FatalEvent| {
            log::error!(
                "{}, {}, {}, {}",
                FATAL,
                secs_since_unix_epoch(fatal_event.timestamp),
                fatal_event.epoch,
                fatal_event.error
            )
        };
        Box::new(logger)
    }
}

fn payload_digest(payload: &[u8]) -> String {
    first_seven_base64_chars(&codec::digest(payload))
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
