use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use taskgraph_rs::{
    networking::{
        messages::{DataRequest, Message, Notice},
        receiving::NodeServer,
        transport::{Address, CallError, Directory, DirectoryError, Transport},
    },
    types::data_types::{NodeCount, NodeID},
};

// An in-process stand-in for a network: maps addresses to the servers of running nodes.
#[derive(Clone, Default)]
pub(crate) struct LocalNetwork {
    servers: Arc<Mutex<HashMap<Address, NodeServer>>>,
}

impl LocalNetwork {
    pub(crate) fn new() -> LocalNetwork {
        Self::default()
    }

    pub(crate) fn address_of(computation_name: &str, node: NodeID) -> Address {
        Address::new(format!("local://{}/{}", computation_name, node))
    }

    pub(crate) fn register(&self, addr: Address, server: NodeServer) {
        self.servers.lock().unwrap().insert(addr, server);
    }

    pub(crate) fn transport(&self) -> LocalTransport {
        LocalTransport {
            network: self.clone(),
            dial_failures: Arc::new(Mutex::new(HashMap::new())),
            response_delay: None,
        }
    }

    fn server(&self, addr: &Address) -> Result<NodeServer, CallError> {
        self.servers
            .lock()
            .unwrap()
            .get(addr)
            .cloned()
            .ok_or_else(|| CallError::Dial(format!("nothing listening at {}", addr)))
    }
}

// A transport that passes every message through its wire encoding and hands it to the addressed
// node's server in the same process.
#[derive(Clone)]
pub(crate) struct LocalTransport {
    network: LocalNetwork,
    dial_failures: Arc<Mutex<HashMap<Address, u32>>>,
    response_delay: Option<Duration>,
}

impl LocalTransport {
    // Make the next `count` dials to `addr` fail, whether they carry requests or notices.
    pub(crate) fn fail_dials(self, addr: Address, count: u32) -> LocalTransport {
        self.dial_failures.lock().unwrap().insert(addr, count);
        self
    }

    // Hold every successful data response for `delay` before returning it to the caller.
    pub(crate) fn delay_responses(mut self, delay: Duration) -> LocalTransport {
        self.response_delay = Some(delay);
        self
    }

    fn dial(&self, addr: &Address) -> Result<NodeServer, CallError> {
        let mut dial_failures = self.dial_failures.lock().unwrap();
        if let Some(remaining) = dial_failures.get_mut(addr) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CallError::Dial(format!("injected dial failure to {}", addr)));
            }
        }
        drop(dial_failures);
        self.network.server(addr)
    }
}

fn over_the_wire(message: Message) -> Result<Message, CallError> {
    let bytes = message
        .to_bytes()
        .map_err(|error| CallError::Invoke(error.to_string()))?;
    Message::from_bytes(&bytes).map_err(|error| CallError::Invoke(error.to_string()))
}

impl Transport for LocalTransport {
    fn call(
        &mut self,
        addr: &Address,
        request: DataRequest,
        timeout: Duration,
    ) -> Result<Vec<u8>, CallError> {
        let server = self.dial(addr)?;
        let request = match over_the_wire(Message::from(request))? {
            Message::DataRequest(request) => request,
            Message::Notice(_) => return Err(CallError::Invoke("message kind changed".into())),
        };
        let payload = server.get_task_data(request).wait_timeout(timeout)?;
        if let Some(delay) = self.response_delay {
            thread::sleep(delay);
        }
        Ok(payload)
    }

    fn post(&mut self, addr: &Address, notice: Notice, timeout: Duration) -> Result<(), CallError> {
        let server = self.dial(addr)?;
        let notice = match over_the_wire(Message::from(notice))? {
            Message::Notice(notice) => notice,
            Message::DataRequest(_) => return Err(CallError::Invoke("message kind changed".into())),
        };
        Ok(server.deliver(notice).wait_timeout(timeout)?)
    }
}

// A directory that knows the address of every node of the computation, except those marked missing.
#[derive(Clone)]
pub(crate) struct LocalDirectory {
    node_count: NodeCount,
    missing: HashSet<NodeID>,
}

impl LocalDirectory {
    pub(crate) fn new(node_count: NodeCount) -> LocalDirectory {
        Self {
            node_count,
            missing: HashSet::new(),
        }
    }

    pub(crate) fn without(mut self, node: NodeID) -> LocalDirectory {
        self.missing.insert(node);
        self
    }
}

impl Directory for LocalDirectory {
    fn resolve_address(
        &self,
        computation_name: &str,
        node_id: NodeID,
    ) -> Result<Address, DirectoryError> {
        if !self.node_count.contains(node_id) || self.missing.contains(&node_id) {
            return Err(DirectoryError::NotFound { node: node_id });
        }
        Ok(LocalNetwork::address_of(computation_name, node_id))
    }
}
