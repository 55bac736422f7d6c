/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The coordinator thread's event loop.

use std::{
    collections::HashSet,
    mem,
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crate::{
    context::{EpochContext, FrameworkHandle},
    data_pipeline::{
        client::{self, OutboundNotice, PendingRequest, ReceivedResponse},
        server::{self, FinishedServe},
    },
    events::*,
    networking::{
        messages::{
            CompletionNotice, DataRequest, EpochAdvanceNotice, MetaNotice, Notice,
        },
        receiving::{InboundNotice, InboundRequest, ServeError},
        sending::SenderHandle,
        transport::{Directory, Transport},
    },
    status::{EpochPhase, NodeStatus},
    task::Task,
    types::data_types::{BufferCapacity, Epoch, LinkKind, NodeCount, NodeID, RequestID},
};

use super::{
    buffer::{BufferedCall, FutureEpochBuffer},
    epoch_state::EpochShared,
    types::{CoordinatorEvent, FatalError},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone)]
pub(crate) struct CoordinatorConfiguration {
    pub(crate) node_id: NodeID,
    pub(crate) node_count: NodeCount,
    pub(crate) aggregator: NodeID,
    pub(crate) initial_epoch: Epoch,
    pub(crate) call_timeout: Duration,
    pub(crate) retry_backoff: Duration,
    pub(crate) future_epoch_buffer_capacity: BufferCapacity,
}

pub(crate) struct Coordinator<K: Task, N: Transport, D: Directory> {
    config: CoordinatorConfiguration,
    task: K,
    framework: FrameworkHandle,
    sender: SenderHandle<N, D>,
    events: Receiver<CoordinatorEvent>,
    to_self: Sender<CoordinatorEvent>,
    shared: Arc<EpochShared>,
    outstanding: HashSet<RequestID>,
    next_request_id: u64,
    buffer: FutureEpochBuffer,
    status: NodeStatus,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
}

impl<K: Task, N: Transport, D: Directory> Coordinator<K, N, D> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: CoordinatorConfiguration,
        task: K,
        framework: FrameworkHandle,
        sender: SenderHandle<N, D>,
        events: Receiver<CoordinatorEvent>,
        to_self: Sender<CoordinatorEvent>,
        status: NodeStatus,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let shared = Arc::new(EpochShared::new(config.initial_epoch, config.node_count));
        let buffer = FutureEpochBuffer::new(config.future_epoch_buffer_capacity, config.call_timeout);
        Self {
            config,
            task,
            framework,
            sender,
            events,
            to_self,
            shared,
            outstanding: HashSet::new(),
            next_request_id: 0,
            buffer,
            status,
            shutdown_signal,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            let framework = self.framework.clone();
            self.task.init(self.config.node_id, &framework);
            self.begin_epoch();

            let outcome = loop {
                match self.shutdown_signal.try_recv() {
                    Ok(()) => break Ok(()),
                    Err(TryRecvError::Empty) => (),
                    Err(TryRecvError::Disconnected) => {
                        panic!("Coordinator thread disconnected from main thread")
                    }
                }

                match self.events.recv_timeout(POLL_INTERVAL) {
                    Ok(event) => {
                        if let Err(fatal) = self.on_event(event) {
                            break Err(fatal);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => (),
                    // Unreachable while `self.to_self` is alive.
                    Err(RecvTimeoutError::Disconnected) => break Ok(()),
                }
            };

            self.stop(outcome.err());
        })
    }

    fn on_event(&mut self, event: CoordinatorEvent) -> Result<(), FatalError> {
        match event {
            CoordinatorEvent::NewRequest {
                epoch,
                target,
                link_kind,
                method,
                input,
            } => self.on_new_request(epoch, target, link_kind, method, input),
            CoordinatorEvent::FlagMeta {
                epoch,
                link_kind,
                meta,
            } => self.on_flag_meta(epoch, link_kind, meta),
            CoordinatorEvent::AnnounceCompletion { epoch, meta } => {
                self.on_announce_completion(epoch, meta)
            }
            CoordinatorEvent::IncEpoch { epoch } => self.on_inc_epoch(epoch),
            CoordinatorEvent::Response(response) => self.on_response(response),
            CoordinatorEvent::RetryRequest(pending) => self.on_retry_request(pending),
            CoordinatorEvent::RequestAbandoned(pending) => self.on_request_abandoned(pending),
            CoordinatorEvent::RetryNotice(outbound) => self.on_retry_notice(outbound),
            CoordinatorEvent::InboundRequest(inbound) => self.on_inbound_request(inbound),
            CoordinatorEvent::InboundNotice(inbound) => self.on_inbound_notice(inbound),
            CoordinatorEvent::ServeFinished(finished) => self.on_serve_finished(finished),
            CoordinatorEvent::ServeAbandoned(inbound) => self.on_serve_abandoned(inbound),
            CoordinatorEvent::Fatal(fatal) => return Err(fatal),
        }
        Ok(())
    }

    fn cur_epoch(&self) -> Epoch {
        self.shared.epoch()
    }

    fn context(&self) -> EpochContext {
        EpochContext::new(
            self.framework.clone(),
            Arc::clone(&self.shared),
            self.to_self.clone(),
        )
    }

    fn is_aggregator(&self) -> bool {
        self.config.node_id == self.config.aggregator
    }

    /* ↓↓↓ Epoch lifecycle ↓↓↓ */

    /// Leave the current epoch and enter `epoch`.
    fn enter_epoch(&mut self, epoch: Epoch) {
        let from = self.cur_epoch();
        self.shared.passed().fire();
        self.outstanding.clear();
        self.shared = Arc::new(EpochShared::new(epoch, self.config.node_count));

        Event::AdvanceEpoch(AdvanceEpochEvent {
            timestamp: SystemTime::now(),
            from,
            to: epoch,
        })
        .publish(&self.event_publisher);

        self.begin_epoch();
    }

    /// Hand the current epoch to the task, then replay the calls that were buffered for it.
    fn begin_epoch(&mut self) {
        let epoch = self.cur_epoch();
        self.status.set_epoch(epoch);
        self.status.set_phase(EpochPhase::Requesting);

        let ctx = self.context();
        self.task.set_epoch(&ctx, epoch);

        Event::StartEpoch(StartEpochEvent {
            timestamp: SystemTime::now(),
            epoch,
        })
        .publish(&self.event_publisher);

        self.reject_timed_out();
        let (expired, current) = self.buffer.take_up_to(epoch);
        for call in expired {
            call.reject(ServeError::EpochMismatch);
        }
        for call in current {
            match call {
                BufferedCall::Request(inbound) => self.on_inbound_request(inbound),
                BufferedCall::Notice(inbound) => self.on_inbound_notice(inbound),
            }
        }
    }

    fn on_announce_completion(&mut self, epoch: Epoch, meta: String) {
        if epoch != self.cur_epoch() {
            return;
        }

        self.status.set_phase(EpochPhase::Announcing);
        Event::AnnounceCompletion(AnnounceCompletionEvent {
            timestamp: SystemTime::now(),
            epoch,
            aggregator: self.config.aggregator,
        })
        .publish(&self.event_publisher);

        let notice = CompletionNotice {
            origin: self.config.node_id,
            epoch,
            meta,
        };
        if self.is_aggregator() {
            self.on_completion(notice);
        } else {
            self.post(self.config.aggregator, notice.into());
        }
    }

    fn on_completion(&mut self, notice: CompletionNotice) {
        if !self.is_aggregator() {
            log::warn!(
                "node {} is not the aggregator, ignoring completion of node {} for epoch {}",
                self.config.node_id,
                notice.origin,
                notice.epoch
            );
            return;
        }

        if !self.shared.completions().record(notice.origin) {
            log::debug!(
                "ignoring repeated completion of node {} for epoch {}",
                notice.origin,
                notice.epoch
            );
            return;
        }

        Event::ReceiveCompletion(ReceiveCompletionEvent {
            timestamp: SystemTime::now(),
            origin: notice.origin,
            epoch: notice.epoch,
            announced: self.shared.completions().announced_count(),
        })
        .publish(&self.event_publisher);

        let ctx = self.context();
        self.task
            .child_meta_ready(&ctx, notice.origin, &notice.meta);
    }

    fn on_inc_epoch(&mut self, epoch: Epoch) {
        if !self.is_aggregator() {
            log::warn!(
                "node {} is not the aggregator, ignoring request to advance from epoch {}",
                self.config.node_id,
                epoch
            );
            return;
        }

        // Repeated requests from the same epoch arrive after it has already passed.
        if epoch != self.cur_epoch() {
            return;
        }

        let completions = self.shared.completions();
        if !completions.all_announced() {
            log::warn!(
                "refusing to advance from epoch {}: {} of {} nodes announced",
                epoch,
                completions.announced_count(),
                self.config.node_count.int()
            );
            return;
        }

        let next = epoch.next();
        for node in self.config.node_count.node_ids() {
            if node != self.config.node_id {
                self.post(
                    node,
                    EpochAdvanceNotice {
                        origin: self.config.node_id,
                        epoch: next,
                    }
                    .into(),
                );
            }
        }
        self.enter_epoch(next);
    }

    /* ↓↓↓ Requesting side ↓↓↓ */

    fn on_new_request(
        &mut self,
        epoch: Epoch,
        target: NodeID,
        link_kind: LinkKind,
        method: String,
        input: Vec<u8>,
    ) {
        if epoch != self.cur_epoch() {
            return;
        }

        let id = RequestID::new(self.next_request_id);
        self.next_request_id += 1;
        self.outstanding.insert(id);

        self.send_request(PendingRequest {
            id,
            target,
            request: DataRequest {
                requester: self.config.node_id,
                epoch,
                link_kind,
                method,
                input,
            },
            attempt: 0,
        });
    }

    fn on_retry_request(&mut self, pending: PendingRequest) {
        if pending.epoch() != self.cur_epoch() || !self.outstanding.contains(&pending.id) {
            self.publish_abandon_request(&pending);
            return;
        }
        self.send_request(pending);
    }

    fn on_request_abandoned(&mut self, pending: PendingRequest) {
        log::debug!(
            "abandon request {:?} to node {}: node has left epoch {}",
            pending.request.method,
            pending.target,
            pending.epoch()
        );
        self.outstanding.remove(&pending.id);
        self.publish_abandon_request(&pending);
    }

    fn send_request(&mut self, pending: PendingRequest) {
        Event::SendDataRequest(SendDataRequestEvent {
            timestamp: SystemTime::now(),
            target: pending.target,
            epoch: pending.epoch(),
            link_kind: pending.request.link_kind,
            method: pending.request.method.clone(),
            attempt: pending.attempt,
        })
        .publish(&self.event_publisher);

        client::start_request(
            pending,
            self.sender.clone(),
            self.config.retry_backoff,
            self.to_self.clone(),
        );
    }

    fn publish_abandon_request(&self, pending: &PendingRequest) {
        Event::AbandonDataRequest(AbandonDataRequestEvent {
            timestamp: SystemTime::now(),
            target: pending.target,
            epoch: pending.epoch(),
            method: pending.request.method.clone(),
        })
        .publish(&self.event_publisher);
    }

    fn on_response(&mut self, response: ReceivedResponse) {
        let discard_reason = if response.epoch != self.cur_epoch() {
            Some(DiscardReason::Stale)
        } else if !self.outstanding.remove(&response.id) {
            Some(DiscardReason::Duplicate)
        } else {
            None
        };

        if let Some(reason) = discard_reason {
            log::debug!(
                "discard response of node {} for epoch {}: {:?}",
                response.origin,
                response.epoch,
                reason
            );
            Event::DiscardDataResponse(DiscardDataResponseEvent {
                timestamp: SystemTime::now(),
                origin: response.origin,
                epoch: response.epoch,
                reason,
            })
            .publish(&self.event_publisher);
            return;
        }

        let ctx = self.context();
        match response.link_kind {
            LinkKind::Parents => self.task.parent_data_ready(
                &ctx,
                response.origin,
                &response.method,
                &response.payload,
            ),
            LinkKind::Children => self.task.child_data_ready(
                &ctx,
                response.origin,
                &response.method,
                &response.payload,
            ),
        }

        if self.shared.record_data_delivered() {
            self.status.set_phase(EpochPhase::Computing);
        } else if self.status.phase() == EpochPhase::Requesting {
            self.status.set_phase(EpochPhase::AwaitingQuorum);
        }

        Event::ReceiveDataResponse(ReceiveDataResponseEvent {
            timestamp: SystemTime::now(),
            origin: response.origin,
            epoch: response.epoch,
            link_kind: response.link_kind,
            method: response.method,
            payload: response.payload,
        })
        .publish(&self.event_publisher);
    }

    /* ↓↓↓ Meta ↓↓↓ */

    fn on_flag_meta(&mut self, epoch: Epoch, link_kind: LinkKind, meta: String) {
        if epoch != self.cur_epoch() {
            return;
        }

        for neighbor in self.framework.neighbors(link_kind, epoch) {
            self.post(
                neighbor,
                MetaNotice {
                    origin: self.config.node_id,
                    epoch,
                    link_kind,
                    meta: meta.clone(),
                }
                .into(),
            );
        }
    }

    fn on_meta(&mut self, notice: MetaNotice) {
        let ctx = self.context();
        // The origin flagged its parents, so it is one of this node's children, and vice versa.
        match notice.link_kind {
            LinkKind::Parents => self
                .task
                .child_meta_ready(&ctx, notice.origin, &notice.meta),
            LinkKind::Children => self
                .task
                .parent_meta_ready(&ctx, notice.origin, &notice.meta),
        }

        Event::ReceiveMeta(ReceiveMetaEvent {
            timestamp: SystemTime::now(),
            origin: notice.origin,
            epoch: notice.epoch,
            link_kind: notice.link_kind,
            meta: notice.meta,
        })
        .publish(&self.event_publisher);
    }

    fn post(&self, target: NodeID, notice: Notice) {
        client::start_post(
            OutboundNotice {
                target,
                notice,
                attempt: 0,
            },
            self.sender.clone(),
            self.config.retry_backoff,
            self.to_self.clone(),
        );
    }

    fn on_retry_notice(&mut self, outbound: OutboundNotice) {
        if outbound.notice.epoch() != self.cur_epoch() {
            log::debug!(
                "abandon notice to node {}: epoch {} has passed",
                outbound.target,
                outbound.notice.epoch()
            );
            return;
        }

        log::info!(
            "retry post notice to node {}, epoch {}, attempt {}",
            outbound.target,
            outbound.notice.epoch(),
            outbound.attempt
        );
        client::start_post(
            outbound,
            self.sender.clone(),
            self.config.retry_backoff,
            self.to_self.clone(),
        );
    }

    /* ↓↓↓ Serving side ↓↓↓ */

    fn on_inbound_notice(&mut self, inbound: InboundNotice) {
        let cur_epoch = self.cur_epoch();

        if let Notice::EpochAdvance(advance) = &inbound.notice {
            let (origin, epoch) = (advance.origin, advance.epoch);
            inbound.answer(Ok(()));
            if origin != self.config.aggregator {
                log::warn!(
                    "ignoring epoch advance from node {}, which is not the aggregator",
                    origin
                );
            } else if epoch > cur_epoch {
                self.enter_epoch(epoch);
            }
            return;
        }

        let epoch = inbound.notice.epoch();
        if epoch < cur_epoch {
            inbound.answer(Err(ServeError::EpochMismatch));
        } else if epoch > cur_epoch {
            self.buffer_call(BufferedCall::Notice(inbound));
        } else {
            let notice = inbound.notice.clone();
            inbound.answer(Ok(()));
            match notice {
                Notice::Meta(meta) => self.on_meta(meta),
                Notice::Completion(completion) => self.on_completion(completion),
                Notice::EpochAdvance(_) => (),
            }
        }
    }

    fn on_inbound_request(&mut self, mut inbound: InboundRequest) {
        let cur_epoch = self.cur_epoch();
        let epoch = inbound.request.epoch;
        if epoch < cur_epoch {
            inbound.answer(Err(ServeError::EpochMismatch));
            return;
        }
        if epoch > cur_epoch {
            self.buffer_call(BufferedCall::Request(inbound));
            return;
        }

        let requester = inbound.request.requester;
        let link_kind = inbound.request.link_kind;
        let method = inbound.request.method.clone();
        let input = mem::take(&mut inbound.request.input);

        Event::ReceiveDataRequest(ReceiveDataRequestEvent {
            timestamp: SystemTime::now(),
            requester,
            epoch,
            link_kind,
            method: method.clone(),
        })
        .publish(&self.event_publisher);

        let responder = server::start_serve(inbound, self.shared.passed(), self.to_self.clone());
        // A requester that reached this node over its parent link is one of this node's children.
        match link_kind {
            LinkKind::Parents => self
                .task
                .serve_as_parent(requester, &method, &input, responder),
            LinkKind::Children => self
                .task
                .serve_as_child(requester, &method, &input, responder),
        }
    }

    fn on_serve_finished(&mut self, finished: FinishedServe) {
        let FinishedServe { inbound, payload } = finished;
        if inbound.request.epoch != self.cur_epoch() {
            self.on_serve_abandoned(inbound);
            return;
        }

        Event::SendDataResponse(SendDataResponseEvent {
            timestamp: SystemTime::now(),
            requester: inbound.request.requester,
            epoch: inbound.request.epoch,
            method: inbound.request.method.clone(),
            payload: payload.clone(),
        })
        .publish(&self.event_publisher);

        inbound.answer(Ok(payload));
    }

    fn on_serve_abandoned(&mut self, inbound: InboundRequest) {
        log::debug!(
            "abandon serve of {:?} for node {}: epoch {} has passed",
            inbound.request.method,
            inbound.request.requester,
            inbound.request.epoch
        );
        Event::AbandonServe(AbandonServeEvent {
            timestamp: SystemTime::now(),
            requester: inbound.request.requester,
            epoch: inbound.request.epoch,
            method: inbound.request.method.clone(),
        })
        .publish(&self.event_publisher);

        inbound.answer(Err(ServeError::EpochMismatch));
    }

    fn buffer_call(&mut self, call: BufferedCall) {
        self.reject_timed_out();
        if let Some(rejected) = self.buffer.insert(call) {
            log::warn!(
                "future-epoch buffer full ({} calls), turning away call for epoch {}",
                self.buffer.len(),
                rejected.epoch()
            );
            rejected.reject(ServeError::Overloaded);
        }
    }

    // The callers of these calls have given up waiting and will retry.
    fn reject_timed_out(&mut self) {
        for call in self.buffer.remove_timed_out() {
            log::debug!(
                "dropping buffered call for epoch {}: held past the call timeout",
                call.epoch()
            );
            call.reject(ServeError::TimedOut);
        }
    }

    /* ↓↓↓ Stopping ↓↓↓ */

    fn stop(&mut self, fatal: Option<FatalError>) {
        if let Some(error) = &fatal {
            log::error!(
                "node {} stopping in epoch {}: {}",
                self.config.node_id,
                self.cur_epoch(),
                error
            );
            Event::Fatal(FatalEvent {
                timestamp: SystemTime::now(),
                epoch: self.cur_epoch(),
                error: error.clone(),
            })
            .publish(&self.event_publisher);
        }

        self.shared.passed().fire();
        for call in self.buffer.drain() {
            call.reject(ServeError::ServerClosed);
        }
        while let Ok(event) = self.events.try_recv() {
            match event {
                CoordinatorEvent::InboundRequest(inbound)
                | CoordinatorEvent::ServeAbandoned(inbound) => {
                    inbound.answer(Err(ServeError::ServerClosed))
                }
                CoordinatorEvent::ServeFinished(finished) => {
                    finished.inbound.answer(Err(ServeError::ServerClosed))
                }
                CoordinatorEvent::InboundNotice(inbound) => {
                    inbound.answer(Err(ServeError::ServerClosed))
                }
                _ => (),
            }
        }

        self.task.exit();
        self.status.stop(fatal);
    }
}
