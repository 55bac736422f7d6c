use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use taskgraph_rs::{
    coordinator::types::FatalError,
    events::DiscardReason,
    node::{Configuration, Node, NodeSpec},
    task::Task,
    topology::{FullTopology, Topology},
    types::data_types::{BufferCapacity, Epoch, NodeCount, NodeID},
};

use super::{
    network::{LocalDirectory, LocalNetwork, LocalTransport},
    recording_task::{Behavior, Recorder, RecordingTask},
};

pub(crate) const COMPUTATION: &str = "test-computation";
pub(crate) const HEARTBEAT: Duration = Duration::from_millis(100);

// The subset of a node's events that tests make assertions on.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Observed {
    SendDataRequest { target: NodeID, epoch: Epoch, attempt: u32 },
    DiscardDataResponse { origin: NodeID, epoch: Epoch, reason: DiscardReason },
    AbandonDataRequest { target: NodeID, epoch: Epoch },
    AbandonServe { requester: NodeID, epoch: Epoch },
    AdvanceEpoch { to: Epoch },
    Fatal(FatalError),
}

#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<Observed>>>);

impl EventLog {
    fn push(&self, observed: Observed) {
        self.0.lock().unwrap().push(observed)
    }

    pub(crate) fn snapshot(&self) -> Vec<Observed> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn contains(&self, observed: &Observed) -> bool {
        self.0.lock().unwrap().contains(observed)
    }

    pub(crate) fn any(&self, f: impl Fn(&Observed) -> bool) -> bool {
        self.0.lock().unwrap().iter().any(f)
    }
}

pub(crate) struct TestNode {
    pub(crate) node: Node,
    pub(crate) events: EventLog,
}

pub(crate) fn configuration(node_id: NodeID, node_count: NodeCount) -> Configuration {
    Configuration::builder()
        .node_id(node_id)
        .node_count(node_count)
        .computation_name(COMPUTATION)
        .heartbeat_interval(HEARTBEAT)
        .log_events(true)
        .build()
}

// Start a node and make it reachable on `network`.
pub(crate) fn start_node<K: Task>(
    task: K,
    topology: impl Topology + 'static,
    network: &LocalNetwork,
    transport: LocalTransport,
    directory: LocalDirectory,
    configuration: Configuration,
) -> TestNode {
    let events = EventLog::default();
    let node_id = configuration.node_id;

    let node = {
        let (e1, e2, e3, e4, e5, e6) = (
            events.clone(),
            events.clone(),
            events.clone(),
            events.clone(),
            events.clone(),
            events.clone(),
        );
        NodeSpec::builder()
            .task(task)
            .topology(topology)
            .transport(transport)
            .directory(directory)
            .configuration(configuration)
            .on_send_data_request(move |event| {
                e1.push(Observed::SendDataRequest {
                    target: event.target,
                    epoch: event.epoch,
                    attempt: event.attempt,
                })
            })
            .on_discard_data_response(move |event| {
                e2.push(Observed::DiscardDataResponse {
                    origin: event.origin,
                    epoch: event.epoch,
                    reason: event.reason,
                })
            })
            .on_abandon_data_request(move |event| {
                e3.push(Observed::AbandonDataRequest {
                    target: event.target,
                    epoch: event.epoch,
                })
            })
            .on_abandon_serve(move |event| {
                e4.push(Observed::AbandonServe {
                    requester: event.requester,
                    epoch: event.epoch,
                })
            })
            .on_advance_epoch(move |event| e5.push(Observed::AdvanceEpoch { to: event.to }))
            .on_fatal(move |event| e6.push(Observed::Fatal(event.error.clone())))
            .build()
            .start()
    };

    network.register(LocalNetwork::address_of(COMPUTATION, node_id), node.server());
    TestNode { node, events }
}

// Start `tasks.len()` nodes over the same network, with topologies made by `topology`.
pub(crate) fn start_cluster<K: Task, T: Topology + 'static>(
    tasks: Vec<K>,
    topology: impl Fn() -> T,
    network: &LocalNetwork,
) -> Vec<TestNode> {
    let node_count = NodeCount::new(tasks.len() as u64);
    tasks
        .into_iter()
        .enumerate()
        .map(|(id, task)| {
            let node_id = NodeID::new(id as u64);
            start_node(
                task,
                topology(),
                network,
                network.transport(),
                LocalDirectory::new(node_count),
                configuration(node_id, node_count),
            )
        })
        .collect()
}

// Start node 1 of a two-node computation whose aggregator, node 0, is played by the test. The node
// neither requests data nor announces completion, whatever `behavior` says.
pub(crate) fn start_follower(
    behavior: Behavior,
    buffer_capacity: Option<usize>,
) -> (TestNode, Recorder) {
    let network = LocalNetwork::new();
    let node_id = NodeID::new(1);
    let node_count = NodeCount::new(2);
    let (task, recorder) = RecordingTask::new(Behavior {
        request_children: false,
        announce: false,
        announce_immediately: false,
        ..behavior
    });
    let mut configuration = configuration(node_id, node_count);
    if let Some(capacity) = buffer_capacity {
        configuration.future_epoch_buffer_capacity = BufferCapacity::new(capacity);
    }
    let node = start_node(
        task,
        FullTopology::new(),
        &network,
        network.transport(),
        LocalDirectory::new(node_count),
        configuration,
    );
    (node, recorder)
}
