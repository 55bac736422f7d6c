use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use taskgraph_rs::{
    codec,
    context::{EpochContext, FrameworkHandle},
    task::{DataResponder, PayloadError, Task},
    types::data_types::{Epoch, LinkKind, NodeID},
};

pub(crate) const PING: &str = "ping";
pub(crate) const DONE: &str = "done";

// How a RecordingTask answers the data requests it is asked to serve.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServeMode {
    // Answer with "<node>@<epoch>" straight away.
    Respond,
    // Keep the responder without ever answering.
    Hold,
    // Fail with an encoding error.
    Fail,
}

#[derive(Clone, Copy)]
pub(crate) struct Behavior {
    // Request data from every child when entering an epoch.
    pub(crate) request_children: bool,
    // Announce completion once all requested data has arrived.
    pub(crate) announce: bool,
    // Announce completion as soon as the epoch starts, without waiting for data.
    pub(crate) announce_immediately: bool,
    pub(crate) serve_mode: ServeMode,
    // The aggregator does not advance past this epoch.
    pub(crate) final_epoch: Epoch,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            request_children: true,
            announce: true,
            announce_immediately: false,
            serve_mode: ServeMode::Respond,
            final_epoch: Epoch::new(0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DataReady {
    pub(crate) epoch: Epoch,
    pub(crate) origin: NodeID,
    pub(crate) link_kind: LinkKind,
    pub(crate) payload: String,
}

#[derive(Default)]
pub(crate) struct Recording {
    pub(crate) initialized: bool,
    pub(crate) exited: bool,
    pub(crate) epochs: Vec<Epoch>,
    pub(crate) data_ready: Vec<DataReady>,
    pub(crate) serves: Vec<(Epoch, NodeID, LinkKind)>,
    pub(crate) metas: Vec<(Epoch, NodeID, LinkKind, String)>,
    pub(crate) latch_releases: Vec<Epoch>,
    pub(crate) held: Vec<(Epoch, DataResponder)>,
}

// Shared view into what a RecordingTask has seen, readable from the test thread.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Recording>>);

impl Recorder {
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Recording) -> R) -> R {
        f(&self.0.lock().unwrap())
    }

    fn write(&self, f: impl FnOnce(&mut Recording)) {
        f(&mut self.0.lock().unwrap())
    }

    pub(crate) fn take_held(&self) -> Vec<(Epoch, DataResponder)> {
        std::mem::take(&mut self.0.lock().unwrap().held)
    }
}

pub(crate) struct RecordingTask {
    node_id: NodeID,
    epoch: Epoch,
    behavior: Behavior,
    recorder: Recorder,
}

impl RecordingTask {
    pub(crate) fn new(behavior: Behavior) -> (RecordingTask, Recorder) {
        let recorder = Recorder::default();
        let task = Self {
            node_id: NodeID::new(0),
            epoch: Epoch::new(0),
            behavior,
            recorder: recorder.clone(),
        };
        (task, recorder)
    }

    fn receive(&mut self, ctx: &EpochContext, origin: NodeID, link_kind: LinkKind, response: &[u8]) {
        let payload = String::from_utf8_lossy(response).into_owned();
        self.recorder.write(|recording| {
            recording.data_ready.push(DataReady {
                epoch: ctx.epoch(),
                origin,
                link_kind,
                payload,
            })
        });
    }

    fn serve(&mut self, requester: NodeID, link_kind: LinkKind, responder: DataResponder) {
        let epoch = self.epoch;
        self.recorder
            .write(|recording| recording.serves.push((epoch, requester, link_kind)));
        match self.behavior.serve_mode {
            ServeMode::Respond => {
                responder.respond(format!("{}@{}", self.node_id, epoch).into_bytes())
            }
            ServeMode::Hold => self
                .recorder
                .write(|recording| recording.held.push((epoch, responder))),
            ServeMode::Fail => match codec::encode(&f64::NAN) {
                Ok(payload) => responder.respond(payload),
                Err(error) => responder.fail(PayloadError::Encoding(error)),
            },
        }
    }

    fn on_meta(&mut self, ctx: &EpochContext, origin: NodeID, link_kind: LinkKind, meta: &str) {
        self.recorder.write(|recording| {
            recording
                .metas
                .push((ctx.epoch(), origin, link_kind, meta.to_string()))
        });
    }
}

impl Task for RecordingTask {
    fn init(&mut self, node_id: NodeID, _: &FrameworkHandle) {
        self.node_id = node_id;
        self.recorder.write(|recording| recording.initialized = true);
    }

    fn exit(&mut self) {
        self.recorder.write(|recording| recording.exited = true);
    }

    fn set_epoch(&mut self, ctx: &EpochContext, epoch: Epoch) {
        self.epoch = epoch;
        self.recorder.write(|recording| recording.epochs.push(epoch));

        if self.behavior.announce_immediately {
            ctx.announce_completion(DONE);
        }

        let children = if self.behavior.request_children {
            ctx.neighbors(LinkKind::Children)
        } else {
            Vec::new()
        };
        let latch = ctx.data_latch(children.len() as u64);
        for child in children {
            ctx.data_request(child, LinkKind::Children, PING, epoch.int().to_le_bytes().to_vec());
        }

        let ctx = ctx.clone();
        let recorder = self.recorder.clone();
        let announce = self.behavior.announce && !self.behavior.announce_immediately;
        thread::spawn(move || {
            while !latch.wait_timeout(Duration::from_millis(20)) {
                if !ctx.is_current() {
                    return;
                }
            }
            recorder.write(|recording| recording.latch_releases.push(epoch));
            if announce {
                ctx.announce_completion(DONE);
            }
        });
    }

    fn parent_meta_ready(&mut self, ctx: &EpochContext, parent: NodeID, meta: &str) {
        self.on_meta(ctx, parent, LinkKind::Parents, meta)
    }

    fn child_meta_ready(&mut self, ctx: &EpochContext, child: NodeID, meta: &str) {
        self.on_meta(ctx, child, LinkKind::Children, meta);
        if meta == DONE
            && ctx.framework().is_aggregator()
            && ctx.all_announced()
            && ctx.epoch() < self.behavior.final_epoch
        {
            ctx.inc_epoch();
        }
    }

    fn parent_data_ready(&mut self, ctx: &EpochContext, parent: NodeID, _: &str, response: &[u8]) {
        self.receive(ctx, parent, LinkKind::Parents, response)
    }

    fn child_data_ready(&mut self, ctx: &EpochContext, child: NodeID, _: &str, response: &[u8]) {
        self.receive(ctx, child, LinkKind::Children, response)
    }

    fn serve_as_parent(&mut self, requester: NodeID, _: &str, _: &[u8], responder: DataResponder) {
        self.serve(requester, LinkKind::Parents, responder)
    }

    fn serve_as_child(&mut self, requester: NodeID, _: &str, _: &[u8], responder: DataResponder) {
        self.serve(requester, LinkKind::Children, responder)
    }
}
