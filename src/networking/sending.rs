/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for making calls to other nodes.

use std::time::Duration;

use crate::types::data_types::NodeID;

use super::{
    messages::{DataRequest, Notice},
    transport::{Address, CallError, Directory, DirectoryError, Transport},
};

/// Handle for resolving node addresses and making calls through the [`Transport`].
///
/// Every call is bounded by the call timeout the handle was created with.
#[derive(Clone)]
pub(crate) struct SenderHandle<T: Transport, D: Directory> {
    transport: T,
    directory: D,
    computation_name: String,
    call_timeout: Duration,
}

impl<T: Transport, D: Directory> SenderHandle<T, D> {
    pub(crate) fn new(
        transport: T,
        directory: D,
        computation_name: String,
        call_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            directory,
            computation_name,
            call_timeout,
        }
    }

    pub(crate) fn resolve(&self, node: NodeID) -> Result<Address, DirectoryError> {
        self.directory
            .resolve_address(&self.computation_name, node)
    }

    pub(crate) fn call(
        &mut self,
        addr: &Address,
        request: DataRequest,
    ) -> Result<Vec<u8>, CallError> {
        self.transport.call(addr, request, self.call_timeout)
    }

    pub(crate) fn post(&mut self, addr: &Address, notice: Notice) -> Result<(), CallError> {
        self.transport.post(addr, notice, self.call_timeout)
    }
}
