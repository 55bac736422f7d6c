//! Calls that arrive ahead of the receiving node's epoch wait until it gets there.

mod common;

use std::{thread, time::Duration};

use log::LevelFilter;
use taskgraph_rs::{
    networking::{
        messages::{DataRequest, EpochAdvanceNotice, MetaNotice, Notice},
        receiving::{NodeServer, ServeError},
    },
    types::data_types::{Epoch, LinkKind, NodeID},
};

use common::{
    logging::{setup_logger, wait_until},
    node::{start_follower, HEARTBEAT},
    recording_task::Behavior,
};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

fn meta(epoch: u64, meta: &str) -> Notice {
    MetaNotice {
        origin: NodeID::new(0),
        epoch: Epoch::new(epoch),
        link_kind: LinkKind::Children,
        meta: meta.to_string(),
    }
    .into()
}

fn advance(server: &NodeServer, epoch: u64) -> Result<(), ServeError> {
    server
        .deliver(
            EpochAdvanceNotice {
                origin: NodeID::new(0),
                epoch: Epoch::new(epoch),
            }
            .into(),
        )
        .wait_timeout(REPLY_TIMEOUT)
}

fn request(epoch: u64) -> DataRequest {
    DataRequest {
        requester: NodeID::new(0),
        epoch: Epoch::new(epoch),
        link_kind: LinkKind::Parents,
        method: String::from("ping"),
        input: Vec::new(),
    }
}

#[test]
fn future_calls_are_replayed_on_entering_their_epoch() {
    setup_logger(LevelFilter::Debug);

    let (node, recorder) = start_follower(Behavior::default(), None);
    let server = node.node.server();

    let pending_meta = server.deliver(meta(1, "ready"));
    let pending_request = server.get_task_data(request(1));

    assert!(recorder.read(|recording| recording.metas.is_empty() && recording.serves.is_empty()));
    assert_eq!(advance(&server, 1), Ok(()));

    assert_eq!(pending_meta.wait_timeout(REPLY_TIMEOUT), Ok(()));
    assert_eq!(
        pending_request.wait_timeout(REPLY_TIMEOUT),
        Ok(b"1@1".to_vec())
    );
    recorder.read(|recording| {
        assert_eq!(recording.epochs, vec![Epoch::new(0), Epoch::new(1)]);
        assert_eq!(
            recording.metas,
            vec![(
                Epoch::new(1),
                NodeID::new(0),
                LinkKind::Parents,
                String::from("ready")
            )]
        );
        assert_eq!(
            recording.serves,
            vec![(Epoch::new(1), NodeID::new(0), LinkKind::Parents)]
        );
    });

    // The node has left epoch 0 behind.
    assert_eq!(
        server.get_task_data(request(0)).wait_timeout(REPLY_TIMEOUT),
        Err(ServeError::EpochMismatch)
    );
    assert_eq!(
        server.deliver(meta(0, "late")).wait_timeout(REPLY_TIMEOUT),
        Err(ServeError::EpochMismatch)
    );
}

#[test]
fn epoch_advance_only_moves_forward_and_only_from_the_aggregator() {
    setup_logger(LevelFilter::Debug);

    let (node, recorder) = start_follower(Behavior::default(), None);
    let server = node.node.server();

    assert_eq!(advance(&server, 3), Ok(()));
    assert!(wait_until(Duration::from_secs(2), || node.node.status().epoch() == Epoch::new(3)));

    // Going back is ignored, but still acknowledged.
    assert_eq!(advance(&server, 2), Ok(()));
    let impostor = EpochAdvanceNotice {
        origin: NodeID::new(1),
        epoch: Epoch::new(9),
    };
    assert_eq!(server.deliver(impostor.into()).wait_timeout(REPLY_TIMEOUT), Ok(()));

    // Serve a current request so that every earlier notice has been processed.
    assert_eq!(
        server.get_task_data(request(3)).wait_timeout(REPLY_TIMEOUT),
        Ok(b"1@3".to_vec())
    );
    assert_eq!(node.node.status().epoch(), Epoch::new(3));
    assert!(recorder.read(|recording| recording.epochs == vec![Epoch::new(0), Epoch::new(3)]));
}

#[test]
fn full_buffer_keeps_the_nearest_epochs() {
    setup_logger(LevelFilter::Debug);

    let (node, _) = start_follower(Behavior::default(), Some(1));
    let server = node.node.server();

    let far = server.deliver(meta(3, "far"));
    let near = server.deliver(meta(2, "near"));
    // The epoch 3 notice made room for the nearer one.
    assert_eq!(far.wait_timeout(REPLY_TIMEOUT), Err(ServeError::Overloaded));

    // Nothing beyond what is held gets in.
    assert_eq!(
        server.deliver(meta(4, "farther")).wait_timeout(REPLY_TIMEOUT),
        Err(ServeError::Overloaded)
    );

    assert_eq!(advance(&server, 2), Ok(()));
    assert_eq!(near.wait_timeout(REPLY_TIMEOUT), Ok(()));
}

#[test]
fn buffered_calls_are_closed_when_the_node_stops() {
    setup_logger(LevelFilter::Debug);

    let (node, recorder) = start_follower(Behavior::default(), None);
    let server = node.node.server();

    let pending = server.get_task_data(request(5));
    drop(node);

    assert_eq!(pending.wait_timeout(REPLY_TIMEOUT), Err(ServeError::ServerClosed));
    assert_eq!(
        server.deliver(meta(0, "after")).wait_timeout(REPLY_TIMEOUT),
        Err(ServeError::ServerClosed)
    );
    assert!(recorder.read(|recording| recording.exited));
}

#[test]
fn buffered_request_given_up_by_its_caller_is_not_served() {
    setup_logger(LevelFilter::Debug);

    let (node, recorder) = start_follower(Behavior::default(), None);
    let server = node.node.server();

    // The caller stops waiting after one heartbeat, backs off, and asks again.
    assert_eq!(
        server.get_task_data(request(1)).wait_timeout(HEARTBEAT),
        Err(ServeError::TimedOut)
    );
    thread::sleep(HEARTBEAT * 2);
    let retry = server.get_task_data(request(1));

    assert_eq!(advance(&server, 1), Ok(()));
    assert_eq!(retry.wait_timeout(REPLY_TIMEOUT), Ok(b"1@1".to_vec()));

    // Only the retry reached the task.
    recorder.read(|recording| {
        assert_eq!(
            recording.serves,
            vec![(Epoch::new(1), NodeID::new(0), LinkKind::Parents)]
        );
    });
}

#[test]
fn calls_given_up_by_their_callers_do_not_take_up_room() {
    setup_logger(LevelFilter::Debug);

    let (node, _) = start_follower(Behavior::default(), Some(1));
    let server = node.node.server();

    assert_eq!(
        server.get_task_data(request(2)).wait_timeout(HEARTBEAT),
        Err(ServeError::TimedOut)
    );
    thread::sleep(HEARTBEAT * 2);

    // The abandoned epoch 2 call no longer fills the buffer, so a later epoch still gets in.
    let pending = server.get_task_data(request(3));
    assert_eq!(advance(&server, 3), Ok(()));
    assert_eq!(pending.wait_timeout(REPLY_TIMEOUT), Ok(b"1@3".to_vec()));
}
