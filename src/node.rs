/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a node.
//!
//! A computation is carried out by a fixed set of `N` nodes, identified by the node IDs `0` to `N - 1`.
//! Each node runs one [`Task`](crate::task::Task), which the framework drives through a sequence of
//! epochs in lockstep with every other node's task.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the node](NodeSpec) with:
//!   1. `NodeSpec::builder` to construct a `NodeSpecBuilder`,
//!   2. The setters of the `NodeSpecBuilder`, and
//!   3. The `NodeSpecBuilder::build` method to construct a [NodeSpec],
//! - The function to [start](NodeSpec::start) a [Node] given its specification,
//! - [The type](Node) which keeps the node alive.
//!
//! ## Starting a node
//!
//! Here is an example that demonstrates how to build and start running a node using the builder
//! pattern:
//!
//! ```ignore
//! let node =
//!     NodeSpec::builder()
//!     .task(task)
//!     .topology(FullTopology::new())
//!     .transport(transport)
//!     .directory(directory)
//!     .configuration(configuration)
//!     .on_advance_epoch(advance_epoch_handler)
//!     .build()
//!     .start();
//! ```
//!
//! Once started, the node's [`NodeServer`] must be made reachable through the transport, so that other
//! nodes' calls can be delivered to it.
//!
//! ### Required setters
//!
//! The required setters are for providing the trait implementations required to run a node:
//! - `.task(...)`
//! - `.topology(...)`
//! - `.transport(...)`
//! - `.directory(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from
//! [crate::events]:
//! - `.on_start_epoch(...)`
//! - `.on_announce_completion(...)`
//! - `.on_receive_completion(...)`
//! - `.on_advance_epoch(...)`
//! - `.on_send_data_request(...)`
//! - `.on_receive_data_response(...)`
//! - `.on_discard_data_response(...)`
//! - `.on_abandon_data_request(...)`
//! - `.on_receive_data_request(...)`
//! - `.on_send_data_response(...)`
//! - `.on_abandon_serve(...)`
//! - `.on_receive_meta(...)`
//! - `.on_fatal(...)`
//!
//! The node's [configuration](Configuration) can also be defined using the builder pattern, for
//! example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .node_id(NodeID::new(1))
//!     .node_count(NodeCount::new(4))
//!     .computation_name(String::from("bwmf"))
//!     .heartbeat_interval(Duration::from_millis(500))
//!     .log_events(true)
//!     .build();
//! ```

use std::{
    sync::{
        mpsc::{self, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::{
    context::FrameworkHandle,
    coordinator::protocol::{Coordinator, CoordinatorConfiguration},
    event_bus::*,
    events::*,
    networking::{
        receiving::NodeServer,
        sending::SenderHandle,
        transport::{Directory, Transport},
    },
    status::NodeStatus,
    task::Task,
    topology::Topology,
    types::data_types::{BufferCapacity, Epoch, NodeCount, NodeID},
};

/// Stores the user-defined parameters required to start a node, that is:
/// 1. The node's ID, and the number of nodes in the computation.
/// 2. The name of the computation, used to look up peers' addresses in the
///    [`Directory`](crate::networking::transport::Directory).
/// 3. The heartbeat interval, which bounds every remote call the node makes.
/// 4. The retry backoff factor. A call that fails transiently is made again after
///    `heartbeat_interval * retry_backoff_factor`.
/// 5. The ID of the aggregator, the node that collects completion announcements and advances the
///    epoch.
/// 6. The epoch every node starts in.
/// 7. The capacity of the future-epoch buffer, in calls.
/// 8. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Node IDs
///
/// Every node of a computation must be configured with the same node count, aggregator, and initial
/// epoch, and with a distinct node ID lower than the node count.
///
/// ## Log Events
///
/// taskgraph_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.node_id(...)`
    - `.node_count(...)`
    - `.computation_name(...)`
    - `.heartbeat_interval(...)`
    - `.log_events(...)`

    Optional:
    - `.retry_backoff_factor(...)`
    - `.aggregator(...)`
    - `.initial_epoch(...)`
    - `.future_epoch_buffer_capacity(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the ID of this node. Required."))]
    pub node_id: NodeID,
    #[builder(setter(doc = "Set the number of nodes in the computation. Required."))]
    pub node_count: NodeCount,
    #[builder(setter(into, doc = "Set the name under which the computation's nodes are registered in the directory. Required."))]
    pub computation_name: String,
    #[builder(setter(doc = "Set the heartbeat interval, which is also the timeout of every remote call. Required."))]
    pub heartbeat_interval: Duration,
    #[builder(default = 2, setter(doc = "Set the multiple of the heartbeat interval to wait before retrying a failed call. Defaults to 2."))]
    pub retry_backoff_factor: u32,
    #[builder(default = NodeID::new(0), setter(doc = "Set the ID of the aggregator. Defaults to node 0."))]
    pub aggregator: NodeID,
    #[builder(default = Epoch::new(0), setter(doc = "Set the epoch every node starts in. Defaults to epoch 0."))]
    pub initial_epoch: Epoch,
    #[builder(default = BufferCapacity::new(1024), setter(doc = "Set the maximum number of future-epoch calls held by the node. Defaults to 1024."))]
    pub future_epoch_buffer_capacity: BufferCapacity,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl Configuration {
    /// Get the time to wait before retrying a call that failed transiently.
    pub fn retry_backoff(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.retry_backoff_factor)
    }
}

impl From<&Configuration> for CoordinatorConfiguration {
    fn from(value: &Configuration) -> Self {
        CoordinatorConfiguration {
            node_id: value.node_id,
            node_count: value.node_count,
            aggregator: value.aggregator,
            initial_epoch: value.initial_epoch,
            call_timeout: value.heartbeat_interval,
            retry_backoff: value.retry_backoff(),
            future_epoch_buffer_capacity: value.future_epoch_buffer_capacity,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [Node].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [NodeSpec]. On the builder call the following methods to construct a valid [NodeSpec].

    Required:
    - `.task(...)`
    - `.topology(...)`
    - `.transport(...)`
    - `.directory(...)`
    - `.configuration(...)`

    Optional:
    - `.on_start_epoch(...)`
    - `.on_announce_completion(...)`
    - `.on_receive_completion(...)`
    - `.on_advance_epoch(...)`
    - `.on_send_data_request(...)`
    - `.on_receive_data_response(...)`
    - `.on_discard_data_response(...)`
    - `.on_abandon_data_request(...)`
    - `.on_receive_data_request(...)`
    - `.on_send_data_response(...)`
    - `.on_abandon_serve(...)`
    - `.on_receive_meta(...)`
    - `.on_fatal(...)`
"))]
pub struct NodeSpec<K: Task, N: Transport, D: Directory> {
    // Required parameters
    #[builder(setter(doc = "Set the task to be run by the node. The argument must implement the [Task](crate::task::Task) trait. Required."))]
    task: K,
    #[builder(setter(transform = |topology: impl Topology + 'static| Box::new(topology) as Box<dyn Topology>,
    doc = "Set the topology of the computation. The argument must implement the [Topology](crate::topology::Topology) trait. Required."))]
    topology: Box<dyn Topology>,
    #[builder(setter(doc = "Set the implementation of remote calls between nodes. The argument must implement the [Transport](crate::networking::transport::Transport) trait. Required."))]
    transport: N,
    #[builder(setter(doc = "Set the directory that maps node IDs to addresses. The argument must implement the [Directory](crate::networking::transport::Directory) trait. Required."))]
    directory: D,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a node. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&StartEpochEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartEpochEvent>),
    doc = "Register a handler closure to be invoked after the node enters a new epoch and hands it to the task. Optional."))]
    on_start_epoch: Option<HandlerPtr<StartEpochEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AnnounceCompletionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AnnounceCompletionEvent>),
    doc = "Register a handler closure to be invoked after the node announces completion of an epoch to the aggregator. Optional."))]
    on_announce_completion: Option<HandlerPtr<AnnounceCompletionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveCompletionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveCompletionEvent>),
    doc = "Register a handler closure to be invoked after the aggregator records a node's completion announcement. Optional."))]
    on_receive_completion: Option<HandlerPtr<ReceiveCompletionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AdvanceEpochEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AdvanceEpochEvent>),
    doc = "Register a handler closure to be invoked after the node leaves an epoch for the next one. Optional."))]
    on_advance_epoch: Option<HandlerPtr<AdvanceEpochEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendDataRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendDataRequestEvent>),
    doc = "Register a handler closure to be invoked after the node makes an attempt at a data request. Optional."))]
    on_send_data_request: Option<HandlerPtr<SendDataRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveDataResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveDataResponseEvent>),
    doc = "Register a handler closure to be invoked after a data response is delivered to the task. Optional."))]
    on_receive_data_response: Option<HandlerPtr<ReceiveDataResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DiscardDataResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DiscardDataResponseEvent>),
    doc = "Register a handler closure to be invoked after a stale or duplicate data response is discarded. Optional."))]
    on_discard_data_response: Option<HandlerPtr<DiscardDataResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AbandonDataRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AbandonDataRequestEvent>),
    doc = "Register a handler closure to be invoked after the node gives up on a data request. Optional."))]
    on_abandon_data_request: Option<HandlerPtr<AbandonDataRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveDataRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveDataRequestEvent>),
    doc = "Register a handler closure to be invoked after an inbound data request is handed to the task. Optional."))]
    on_receive_data_request: Option<HandlerPtr<ReceiveDataRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendDataResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendDataResponseEvent>),
    doc = "Register a handler closure to be invoked after the task's payload is sent back to a requester. Optional."))]
    on_send_data_response: Option<HandlerPtr<SendDataResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AbandonServeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AbandonServeEvent>),
    doc = "Register a handler closure to be invoked after a serve is abandoned because its epoch passed. Optional."))]
    on_abandon_serve: Option<HandlerPtr<AbandonServeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveMetaEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveMetaEvent>),
    doc = "Register a handler closure to be invoked after meta flagged by a neighbor is delivered to the task. Optional."))]
    on_receive_meta: Option<HandlerPtr<ReceiveMetaEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FatalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FatalEvent>),
    doc = "Register a handler closure to be invoked after the node stops because of a fatal error. Optional."))]
    on_fatal: Option<HandlerPtr<FatalEvent>>,
}

impl<K: Task, N: Transport, D: Directory> NodeSpec<K, N, D> {
    /// Starts all threads and channels associated with running a node, and returns the handles to them
    /// in a [Node] struct.
    pub fn start(self) -> Node {
        let configuration = self.configuration;

        let mut topology = self.topology;
        topology.configure(configuration.node_count, configuration.node_id);
        let topology: Arc<dyn Topology> = Arc::from(topology);

        let event_handlers = EventHandlers::new(
            configuration.log_events,
            self.on_start_epoch,
            self.on_announce_completion,
            self.on_receive_completion,
            self.on_advance_epoch,
            self.on_send_data_request,
            self.on_receive_data_response,
            self.on_discard_data_response,
            self.on_abandon_data_request,
            self.on_receive_data_request,
            self.on_send_data_response,
            self.on_abandon_serve,
            self.on_receive_meta,
            self.on_fatal,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let (event_bus_shutdown, event_bus) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(
                    event_handlers,
                    event_subscriber,
                    event_bus_shutdown_receiver,
                );
                (Some(event_bus_shutdown), Some(event_bus))
            }
            None => (None, None),
        };

        let status = NodeStatus::new(configuration.initial_epoch);
        let framework = FrameworkHandle::new(
            configuration.node_id,
            configuration.node_count,
            configuration.aggregator,
            topology,
            status.clone(),
        );
        let sender = SenderHandle::new(
            self.transport,
            self.directory,
            configuration.computation_name.clone(),
            configuration.heartbeat_interval,
        );

        let (to_coordinator, coordinator_events) = mpsc::channel();
        let (coordinator_shutdown, coordinator_shutdown_receiver) = mpsc::channel();
        let coordinator = Coordinator::new(
            CoordinatorConfiguration::from(&configuration),
            self.task,
            framework,
            sender,
            coordinator_events,
            to_coordinator.clone(),
            status.clone(),
            coordinator_shutdown_receiver,
            event_publisher,
        )
        .start();

        Node {
            node_id: configuration.node_id,
            status,
            server: NodeServer::new(to_coordinator),
            coordinator: Some(coordinator),
            coordinator_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// A handle to the background threads of a taskgraph_rs node. When this value is dropped, all
/// background threads are gracefully shut down.
pub struct Node {
    node_id: NodeID,
    status: NodeStatus,
    server: NodeServer,
    coordinator: Option<JoinHandle<()>>,
    coordinator_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Node {
    pub fn node_id(&self) -> NodeID {
        self.node_id
    }

    /// Get a view of the node's current epoch, phase, and liveness.
    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    /// Get a handle that delivers inbound calls to this node. A transport implementation hands every
    /// call addressed to this node to this handle.
    pub fn server(&self) -> NodeServer {
        self.server.clone()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // The coordinator publishes events until it exits, so the event bus is shut down after it. The
        // coordinator may already have exited by itself after a fatal error.
        let _ = self.coordinator_shutdown.send(());
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.join();
        }

        if let Some(event_bus_shutdown) = self.event_bus_shutdown.take() {
            let _ = event_bus_shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}
