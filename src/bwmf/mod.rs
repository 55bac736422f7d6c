/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Block-wise matrix factorization: a reference [`Task`] that factorizes a matrix `A ≈ D × T` across
//! the nodes of a computation.
//!
//! Every node owns one row shard of `D` and one row shard of `T` (`T` is laid out transposed). Epochs
//! alternate between the two factors:
//! - In even epochs, `D` is fixed. Every node fetches the `D` shards of all its neighbors with the
//!   `getD` method, and recomputes its own shard of `T` from the full `D`.
//! - In odd epochs, `T` is fixed, and every node recomputes its own shard of `D` from the full `T`
//!   fetched with `getT`.
//!
//! Once a node has updated its shard, it announces `"computed"` to the aggregator, which starts the
//! next epoch once every node has done so.
//!
//! The numerical work is not part of this module: the new shard is computed by a user-provided
//! [`LocalUpdate`]. Neither is loading of stored shards, which is provided through a
//! [`CheckpointLoader`]. Nodes that have no checkpoint start from randomly filled shards.
//!
//! This task expects a topology in which every other node is its child, such as
//! [`FullTopology`](crate::topology::FullTopology).

pub mod shard;

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use rand::{rngs::StdRng, SeedableRng};
use typed_builder::TypedBuilder;

use crate::{
    codec,
    context::{EpochContext, FrameworkHandle},
    task::{DataResponder, PayloadError, Task},
    types::data_types::{Epoch, LinkKind, NodeID},
};

use self::shard::Shard;

pub const GET_D: &str = "getD";
pub const GET_T: &str = "getT";
pub const COMPUTED: &str = "computed";

const LATCH_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Computes a node's new shard of one factor from the full other factor.
pub trait LocalUpdate: Send + 'static {
    /// Compute the new value of `current`, this node's shard of the factor being updated in `epoch`.
    ///
    /// `fixed` holds every node's shard of the other factor, ordered by node ID.
    fn update(&mut self, epoch: Epoch, current: &Shard, fixed: &[Shard]) -> Shard;
}

/// Both shards owned by a node, as stored in a checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct BwmfCheckpoint {
    pub d_shard: Shard,
    pub t_shard: Shard,
}

/// Loads a node's shards from durable storage.
pub trait CheckpointLoader: Send + 'static {
    /// Load the shards of `node_id` from its last checkpoint, or return `None` if there is none.
    fn load_checkpoint(&mut self, node_id: NodeID) -> Option<BwmfCheckpoint>;
}

/// A [`CheckpointLoader`] that never finds a checkpoint.
pub struct NoCheckpoint;

impl CheckpointLoader for NoCheckpoint {
    fn load_checkpoint(&mut self, _: NodeID) -> Option<BwmfCheckpoint> {
        None
    }
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct BwmfConfiguration {
    #[builder(setter(doc = "Set the number of rows of each node's shard of D. Required."))]
    pub d_rows_per_shard: usize,
    #[builder(setter(doc = "Set the number of rows of each node's shard of T. Required."))]
    pub t_rows_per_shard: usize,
    #[builder(setter(doc = "Set the number of latent topics, i.e. the width of every row. Required."))]
    pub topics: usize,
    #[builder(default, setter(strip_option, doc = "Set the last epoch of the factorization. The aggregator does not advance past it. Optional."))]
    pub final_epoch: Option<Epoch>,
    #[builder(default = 0, setter(doc = "Set the seed used to fill shards that are not loaded from a checkpoint. Defaults to 0."))]
    pub seed: u64,
}

pub struct BwmfTask<U: LocalUpdate, C: CheckpointLoader> {
    config: BwmfConfiguration,
    node_id: NodeID,
    loader: C,
    updater: Arc<Mutex<U>>,
    state: Arc<Mutex<BwmfState>>,
}

struct BwmfState {
    epoch: Epoch,
    d_shard: Shard,
    t_shard: Shard,
    fixed: BTreeMap<NodeID, Shard>,
}

impl<U: LocalUpdate, C: CheckpointLoader> BwmfTask<U, C> {
    pub fn new(config: BwmfConfiguration, updater: U, loader: C) -> Self {
        Self {
            config,
            node_id: NodeID::new(0),
            loader,
            updater: Arc::new(Mutex::new(updater)),
            state: Arc::new(Mutex::new(BwmfState {
                epoch: Epoch::new(0),
                d_shard: Shard::default(),
                t_shard: Shard::default(),
                fixed: BTreeMap::new(),
            })),
        }
    }

    /// Get a handle to this task's shards that stays valid after the task is moved into a node.
    pub fn shards_handle(&self) -> ShardsHandle {
        ShardsHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn receive_shard(
        &mut self,
        ctx: &EpochContext,
        origin: NodeID,
        method: &str,
        response: &[u8],
    ) {
        match codec::decode::<Shard>(response) {
            Ok(shard) => {
                let mut state = lock(&self.state);
                if state.epoch == ctx.epoch() {
                    state.fixed.insert(origin, shard);
                }
            }
            Err(error) => log::error!(
                "failed to decode {} response of node {} in epoch {}: {}",
                method,
                origin,
                ctx.epoch(),
                error
            ),
        }
    }

    fn serve(&self, method: &str, responder: DataResponder) {
        let state = Arc::clone(&self.state);
        let method = method.to_string();
        thread::spawn(move || {
            let state = lock(&state);
            let shard = match method.as_str() {
                GET_D => &state.d_shard,
                GET_T => &state.t_shard,
                _ => return responder.fail(PayloadError::UnknownMethod(method.clone())),
            };
            responder.respond_with(codec::encode(shard))
        });
    }
}

impl<U: LocalUpdate, C: CheckpointLoader> Task for BwmfTask<U, C> {
    fn init(&mut self, node_id: NodeID, _: &FrameworkHandle) {
        self.node_id = node_id;

        let checkpoint = self.loader.load_checkpoint(node_id).unwrap_or_else(|| {
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(node_id.int()));
            let mut d_shard = Shard::zeros(
                self.config.d_rows_per_shard,
                self.config.topics,
                (self.config.d_rows_per_shard as u64) * node_id.int(),
            );
            let mut t_shard = Shard::zeros(
                self.config.t_rows_per_shard,
                self.config.topics,
                (self.config.t_rows_per_shard as u64) * node_id.int(),
            );
            d_shard.random_fill(&mut rng);
            t_shard.random_fill(&mut rng);
            BwmfCheckpoint { d_shard, t_shard }
        });

        let mut state = lock(&self.state);
        state.d_shard = checkpoint.d_shard;
        state.t_shard = checkpoint.t_shard;
    }

    fn exit(&mut self) {
        log::info!("bwmf task of node {} exiting", self.node_id);
    }

    fn set_epoch(&mut self, ctx: &EpochContext, epoch: Epoch) {
        let method = if epoch.is_even() { GET_D } else { GET_T };
        {
            let mut state = lock(&self.state);
            state.epoch = epoch;
            let own = if epoch.is_even() {
                state.d_shard.clone()
            } else {
                state.t_shard.clone()
            };
            state.fixed.clear();
            state.fixed.insert(self.node_id, own);
        }

        let children = ctx.neighbors(LinkKind::Children);
        let latch = ctx.data_latch(children.len() as u64);
        for child in children {
            ctx.data_request(child, LinkKind::Children, method, Vec::new());
        }

        let ctx = ctx.clone();
        let state = Arc::clone(&self.state);
        let updater = Arc::clone(&self.updater);
        thread::spawn(move || {
            while !latch.wait_timeout(LATCH_POLL_INTERVAL) {
                if !ctx.is_current() {
                    return;
                }
            }

            {
                let mut state = lock(&state);
                let fixed: Vec<Shard> = state.fixed.values().cloned().collect();
                let mut updater = lock(&updater);
                if epoch.is_even() {
                    let updated = updater.update(epoch, &state.t_shard, &fixed);
                    state.t_shard = updated;
                } else {
                    let updated = updater.update(epoch, &state.d_shard, &fixed);
                    state.d_shard = updated;
                }
            }

            ctx.announce_completion(COMPUTED);
        });
    }

    fn parent_meta_ready(&mut self, _: &EpochContext, _: NodeID, _: &str) {}

    fn child_meta_ready(&mut self, ctx: &EpochContext, _: NodeID, meta: &str) {
        if meta != COMPUTED || !ctx.framework().is_aggregator() || !ctx.all_announced() {
            return;
        }
        if self
            .config
            .final_epoch
            .map_or(true, |final_epoch| ctx.epoch() < final_epoch)
        {
            ctx.inc_epoch();
        }
    }

    fn parent_data_ready(
        &mut self,
        ctx: &EpochContext,
        parent: NodeID,
        method: &str,
        response: &[u8],
    ) {
        self.receive_shard(ctx, parent, method, response)
    }

    fn child_data_ready(
        &mut self,
        ctx: &EpochContext,
        child: NodeID,
        method: &str,
        response: &[u8],
    ) {
        self.receive_shard(ctx, child, method, response)
    }

    fn serve_as_parent(&mut self, _: NodeID, method: &str, _: &[u8], responder: DataResponder) {
        self.serve(method, responder)
    }

    fn serve_as_child(&mut self, _: NodeID, method: &str, _: &[u8], responder: DataResponder) {
        self.serve(method, responder)
    }
}

/// Cloneable read access to a [`BwmfTask`]'s shards.
#[derive(Clone)]
pub struct ShardsHandle {
    state: Arc<Mutex<BwmfState>>,
}

impl ShardsHandle {
    /// Get a copy of the task's current shards of D and T.
    pub fn shards(&self) -> BwmfCheckpoint {
        let state = lock(&self.state);
        BwmfCheckpoint {
            d_shard: state.d_shard.clone(),
            t_shard: state.t_shard.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
