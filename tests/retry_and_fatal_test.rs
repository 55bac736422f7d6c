mod common;

use std::time::Duration;

use log::LevelFilter;
use taskgraph_rs::{
    coordinator::types::FatalError,
    networking::{
        messages::DataRequest,
        receiving::ServeError,
        transport::DirectoryError,
    },
    task::PayloadError,
    topology::FullTopology,
    types::data_types::{Epoch, LinkKind, NodeCount, NodeID},
};

use common::{
    logging::{logged, setup_logger, wait_until},
    network::{LocalDirectory, LocalNetwork},
    node::{configuration, start_node, Observed, COMPUTATION},
    recording_task::{Behavior, RecordingTask, ServeMode, PING},
};

#[test]
fn transient_dial_failure_is_retried_and_served_once() {
    setup_logger(LevelFilter::Debug);

    let network = LocalNetwork::new();
    let node_count = NodeCount::new(3);
    let node_0_addr = LocalNetwork::address_of(COMPUTATION, NodeID::new(0));

    let (tasks, recorders): (Vec<_>, Vec<_>) = (0..3)
        .map(|_| RecordingTask::new(Behavior::default()))
        .unzip();
    let nodes: Vec<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(id, task)| {
            let node_id = NodeID::new(id as u64);
            let transport = if id == 1 {
                network.transport().fail_dials(node_0_addr.clone(), 1)
            } else {
                network.transport()
            };
            start_node(
                task,
                FullTopology::new(),
                &network,
                transport,
                LocalDirectory::new(node_count),
                configuration(node_id, node_count),
            )
        })
        .collect();

    assert!(wait_until(Duration::from_secs(10), || {
        recorders[1].read(|recording| recording.latch_releases == vec![Epoch::new(0)])
    }));

    // The failed attempt never reached node 0, so node 0 served node 1 exactly once.
    let serves_of_node_1 = recorders[0].read(|recording| {
        recording
            .serves
            .iter()
            .filter(|(_, requester, _)| *requester == NodeID::new(1))
            .count()
    });
    assert_eq!(serves_of_node_1, 1);

    let events = nodes[1].events.snapshot();
    assert!(events.contains(&Observed::SendDataRequest {
        target: NodeID::new(0),
        epoch: Epoch::new(0),
        attempt: 0
    }));
    assert!(events.contains(&Observed::SendDataRequest {
        target: NodeID::new(0),
        epoch: Epoch::new(0),
        attempt: 1
    }));

    // Both attempts are logged, and so is the failure, each with its attempt number.
    let node_0 = format!("node 0, addr {}, epoch 0", node_0_addr);
    assert!(logged(&["request data from", &node_0, "attempt 0"]));
    assert!(logged(&["request data from", &node_0, "attempt 0 failed", "injected dial failure"]));
    assert!(logged(&["retry request data from", &node_0, "attempt 1"]));

    recorders[1].read(|recording| {
        assert!(recording
            .data_ready
            .iter()
            .any(|ready| ready.origin == NodeID::new(0) && ready.payload == "0@0"));
    });
    assert!(nodes.iter().all(|node| node.node.status().is_running()));
}

#[test]
fn payload_encoding_failure_stops_the_serving_node() {
    setup_logger(LevelFilter::Debug);

    let network = LocalNetwork::new();
    let node_count = NodeCount::new(2);
    let (failing_task, failing_recorder) = RecordingTask::new(Behavior {
        serve_mode: ServeMode::Fail,
        ..Behavior::default()
    });
    let (task_1, _) = RecordingTask::new(Behavior::default());

    let node_0 = start_node(
        failing_task,
        FullTopology::new(),
        &network,
        network.transport(),
        LocalDirectory::new(node_count),
        configuration(NodeID::new(0), node_count),
    );
    let _node_1 = start_node(
        task_1,
        FullTopology::new(),
        &network,
        network.transport(),
        LocalDirectory::new(node_count),
        configuration(NodeID::new(1), node_count),
    );

    assert!(wait_until(Duration::from_secs(10), || {
        !node_0.node.status().is_running()
    }));

    let fatal_error = node_0.node.status().fatal_error();
    assert!(matches!(
        &fatal_error,
        Some(FatalError::PayloadProduction {
            requester,
            method,
            error: PayloadError::Encoding(_),
        }) if *requester == NodeID::new(1) && method == PING
    ));
    assert!(wait_until(Duration::from_secs(2), || {
        node_0
            .events
            .any(|observed| matches!(observed, Observed::Fatal(_)))
    }));
    assert!(failing_recorder.read(|recording| recording.exited));

    // A stopped node answers nothing but ServerClosed.
    let reply = node_0
        .node
        .server()
        .get_task_data(DataRequest {
            requester: NodeID::new(1),
            epoch: Epoch::new(0),
            link_kind: LinkKind::Children,
            method: String::from(PING),
            input: Vec::new(),
        })
        .wait_timeout(Duration::from_secs(1));
    assert_eq!(reply, Err(ServeError::ServerClosed));
}

#[test]
fn unresolvable_neighbor_stops_the_requesting_node() {
    setup_logger(LevelFilter::Debug);

    let network = LocalNetwork::new();
    let node_count = NodeCount::new(3);
    let (tasks, recorders): (Vec<_>, Vec<_>) = (0..3)
        .map(|_| RecordingTask::new(Behavior::default()))
        .unzip();
    let nodes: Vec<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(id, task)| {
            let directory = if id == 1 {
                LocalDirectory::new(node_count).without(NodeID::new(2))
            } else {
                LocalDirectory::new(node_count)
            };
            start_node(
                task,
                FullTopology::new(),
                &network,
                network.transport(),
                directory,
                configuration(NodeID::new(id as u64), node_count),
            )
        })
        .collect();

    assert!(wait_until(Duration::from_secs(10), || {
        !nodes[1].node.status().is_running()
    }));
    assert_eq!(
        nodes[1].node.status().fatal_error(),
        Some(FatalError::AddressResolution {
            node: NodeID::new(2),
            error: DirectoryError::NotFound {
                node: NodeID::new(2)
            },
        })
    );
    assert!(recorders[1].read(|recording| recording.exited));
    assert!(nodes[0].node.status().is_running());
    assert!(nodes[2].node.status().is_running());
}
