//! Nodes exchange data within an epoch and move to the next one only once every node has announced
//! completion to the aggregator.

mod common;

use std::{thread, time::Duration};

use log::LevelFilter;
use taskgraph_rs::{
    status::EpochPhase,
    topology::FullTopology,
    types::data_types::{Epoch, LinkKind, NodeID},
};

use common::{
    logging::{setup_logger, wait_until},
    network::LocalNetwork,
    node::{start_cluster, Observed},
    recording_task::{Behavior, RecordingTask, DONE},
};

#[test]
fn three_nodes_exchange_data_and_advance_together() {
    setup_logger(LevelFilter::Debug);

    let network = LocalNetwork::new();
    let (tasks, recorders): (Vec<_>, Vec<_>) = (0..3)
        .map(|_| {
            RecordingTask::new(Behavior {
                final_epoch: Epoch::new(1),
                ..Behavior::default()
            })
        })
        .unzip();
    let nodes = start_cluster(tasks, FullTopology::new, &network);

    assert!(wait_until(Duration::from_secs(10), || {
        nodes.iter().all(|node| node.node.status().epoch() == Epoch::new(1))
            && recorders
                .iter()
                .all(|recorder| recorder.read(|recording| recording.latch_releases.len() == 2))
    }));
    // Give late duplicates a chance to show up.
    thread::sleep(Duration::from_millis(500));

    for (id, recorder) in recorders.iter().enumerate() {
        let me = NodeID::new(id as u64);
        recorder.read(|recording| {
            assert!(recording.initialized);
            assert_eq!(recording.epochs, vec![Epoch::new(0), Epoch::new(1)]);
            assert_eq!(recording.latch_releases, vec![Epoch::new(0), Epoch::new(1)]);

            for epoch in [Epoch::new(0), Epoch::new(1)] {
                let mut origins: Vec<NodeID> = recording
                    .data_ready
                    .iter()
                    .filter(|ready| ready.epoch == epoch)
                    .map(|ready| ready.origin)
                    .collect();
                origins.sort();
                let expected: Vec<NodeID> =
                    (0..3).map(NodeID::new).filter(|other| *other != me).collect();
                assert_eq!(origins, expected, "node {} in epoch {}", me, epoch);
            }
            for ready in &recording.data_ready {
                assert_eq!(ready.link_kind, LinkKind::Children);
                assert_eq!(ready.payload, format!("{}@{}", ready.origin, ready.epoch));
            }
        });
    }

    // Every node was told to advance exactly once.
    for node in &nodes {
        let advances: Vec<Observed> = node
            .events
            .snapshot()
            .into_iter()
            .filter(|observed| matches!(observed, Observed::AdvanceEpoch { .. }))
            .collect();
        assert_eq!(advances, vec![Observed::AdvanceEpoch { to: Epoch::new(1) }]);
    }

    // The aggregator saw each node's completion of epoch 0, its own included.
    recorders[0].read(|recording| {
        let mut announced: Vec<NodeID> = recording
            .metas
            .iter()
            .filter(|(epoch, _, _, meta)| *epoch == Epoch::new(0) && meta == DONE)
            .map(|(_, origin, _, _)| *origin)
            .collect();
        announced.sort();
        assert_eq!(announced, vec![NodeID::new(0), NodeID::new(1), NodeID::new(2)]);
    });
}

#[test]
fn epoch_does_not_advance_until_the_aggregator_announces() {
    setup_logger(LevelFilter::Debug);

    let network = LocalNetwork::new();
    let behavior = Behavior {
        final_epoch: Epoch::new(5),
        ..Behavior::default()
    };
    let (aggregator_task, aggregator_recorder) = RecordingTask::new(Behavior {
        announce: false,
        ..behavior
    });
    let (task_1, _) = RecordingTask::new(behavior);
    let (task_2, _) = RecordingTask::new(behavior);
    let nodes = start_cluster(vec![aggregator_task, task_1, task_2], FullTopology::new, &network);

    // Both other nodes announced.
    assert!(wait_until(Duration::from_secs(10), || {
        aggregator_recorder.read(|recording| {
            recording
                .metas
                .iter()
                .filter(|(_, _, _, meta)| meta == DONE)
                .count()
                == 2
        })
    }));
    thread::sleep(Duration::from_millis(500));

    for node in &nodes {
        assert_eq!(node.node.status().epoch(), Epoch::new(0));
        assert!(node.node.status().is_running());
        assert!(!node
            .events
            .any(|observed| matches!(observed, Observed::AdvanceEpoch { .. })));
    }
    aggregator_recorder.read(|recording| {
        assert_eq!(recording.latch_releases, vec![Epoch::new(0)]);
        assert_eq!(recording.epochs, vec![Epoch::new(0)]);
    });
    // The other nodes are done and waiting on the barrier.
    assert_eq!(nodes[1].node.status().phase(), EpochPhase::Announcing);
}
