/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which fires the handlers registered for each [event](crate::events).

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The handlers registered for every kind of event. A kind of event may have a user-defined handler,
/// a logger, both, or neither.
pub(crate) struct EventHandlers {
    pub(crate) start_epoch_handlers: Vec<HandlerPtr<StartEpochEvent>>,
    pub(crate) announce_completion_handlers: Vec<HandlerPtr<AnnounceCompletionEvent>>,
    pub(crate) receive_completion_handlers: Vec<HandlerPtr<ReceiveCompletionEvent>>,
    pub(crate) advance_epoch_handlers: Vec<HandlerPtr<AdvanceEpochEvent>>,
    pub(crate) send_data_request_handlers: Vec<HandlerPtr<SendDataRequestEvent>>,
    pub(crate) receive_data_response_handlers: Vec<HandlerPtr<ReceiveDataResponseEvent>>,
    pub(crate) discard_data_response_handlers: Vec<HandlerPtr<DiscardDataResponseEvent>>,
    pub(crate) abandon_data_request_handlers: Vec<HandlerPtr<AbandonDataRequestEvent>>,
    pub(crate) receive_data_request_handlers: Vec<HandlerPtr<ReceiveDataRequestEvent>>,
    pub(crate) send_data_response_handlers: Vec<HandlerPtr<SendDataResponseEvent>>,
    pub(crate) abandon_serve_handlers: Vec<HandlerPtr<AbandonServeEvent>>,
    pub(crate) receive_meta_handlers: Vec<HandlerPtr<ReceiveMetaEvent>>,
    pub(crate) fatal_handlers: Vec<HandlerPtr<FatalEvent>>,
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        start_epoch_handler: Option<HandlerPtr<StartEpochEvent>>,
        announce_completion_handler: Option<HandlerPtr<AnnounceCompletionEvent>>,
        receive_completion_handler: Option<HandlerPtr<ReceiveCompletionEvent>>,
        advance_epoch_handler: Option<HandlerPtr<AdvanceEpochEvent>>,
        send_data_request_handler: Option<HandlerPtr<SendDataRequestEvent>>,
        receive_data_response_handler: Option<HandlerPtr<ReceiveDataResponseEvent>>,
        discard_data_response_handler: Option<HandlerPtr<DiscardDataResponseEvent>>,
        abandon_data_request_handler: Option<HandlerPtr<AbandonDataRequestEvent>>,
        receive_data_request_handler: Option<HandlerPtr<ReceiveDataRequestEvent>>,
        send_data_response_handler: Option<HandlerPtr<SendDataResponseEvent>>,
        abandon_serve_handler: Option<HandlerPtr<AbandonServeEvent>>,
        receive_meta_handler: Option<HandlerPtr<ReceiveMetaEvent>>,
        fatal_handler: Option<HandlerPtr<FatalEvent>>,
    ) -> EventHandlers {
        fn handlers<T: Logger>(
            log_events: bool,
            handler: Option<HandlerPtr<T>>,
        ) -> Vec<HandlerPtr<T>> {
            let mut handlers = Vec::new();
            if let Some(handler) = handler {
                handlers.push(handler)
            }
            if log_events {
                handlers.push(T::get_logger())
            }
            handlers
        }

        Self {
            start_epoch_handlers: handlers(log_events, start_epoch_handler),
            announce_completion_handlers: handlers(log_events, announce_completion_handler),
            receive_completion_handlers: handlers(log_events, receive_completion_handler),
            advance_epoch_handlers: handlers(log_events, advance_epoch_handler),
            send_data_request_handlers: handlers(log_events, send_data_request_handler),
            receive_data_response_handlers: handlers(log_events, receive_data_response_handler),
            discard_data_response_handlers: handlers(log_events, discard_data_response_handler),
            abandon_data_request_handlers: handlers(log_events, abandon_data_request_handler),
            receive_data_request_handlers: handlers(log_events, receive_data_request_handler),
            send_data_response_handlers: handlers(log_events, send_data_response_handler),
            abandon_serve_handlers: handlers(log_events, abandon_serve_handler),
            receive_meta_handlers: handlers(log_events, receive_meta_handler),
            fatal_handlers: handlers(log_events, fatal_handler),
        }
    }

    /// Check whether no handler at all is registered, in which case the event bus need not run.
    pub(crate) fn is_empty(&self) -> bool {
        self.start_epoch_handlers.is_empty() &&
        self.announce_completion_handlers.is_empty() &&
        self.receive_completion_handlers.is_empty() &&
        self.advance_epoch_handlers.is_empty() &&
        self.send_data_request_handlers.is_empty() &&
        self.receive_data_response_handlers.is_empty() &&
        self.discard_data_response_handlers.is_empty() &&
        self.abandon_data_request_handlers.is_empty() &&
        self.receive_data_request_handlers.is_empty() &&
        self.send_data_response_handlers.is_empty() &&
        self.abandon_serve_handlers.is_empty() &&
        self.receive_meta_handlers.is_empty() &&
        self.fatal_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StartEpoch(start_epoch_event) => self
                .start_epoch_handlers
                .iter()
                .for_each(|handler| handler(&start_epoch_event)),
            Event::AnnounceCompletion(announce_completion_event) => self
                .announce_completion_handlers
                .iter()
                .for_each(|handler| handler(&announce_completion_event)),
            Event::ReceiveCompletion(receive_completion_event) => self
                .receive_completion_handlers
                .iter()
                .for_each(|handler| handler(&receive_completion_event)),
            Event::AdvanceEpoch(advance_epoch_event) => self
                .advance_epoch_handlers
                .iter()
                .for_each(|handler| handler(&advance_epoch_event)),
            Event::SendDataRequest(send_data_request_event) => self
                .send_data_request_handlers
                .iter()
                .for_each(|handler| handler(&send_data_request_event)),
            Event::ReceiveDataResponse(receive_data_response_event) => self
                .receive_data_response_handlers
                .iter()
                .for_each(|handler| handler(&receive_data_response_event)),
            Event::DiscardDataResponse(discard_data_response_event) => self
                .discard_data_response_handlers
                .iter()
                .for_each(|handler| handler(&discard_data_response_event)),
            Event::AbandonDataRequest(abandon_data_request_event) => self
                .abandon_data_request_handlers
                .iter()
                .for_each(|handler| handler(&abandon_data_request_event)),
            Event::ReceiveDataRequest(receive_data_request_event) => self
                .receive_data_request_handlers
                .iter()
                .for_each(|handler| handler(&receive_data_request_event)),
            Event::SendDataResponse(send_data_response_event) => self
                .send_data_response_handlers
                .iter()
                .for_each(|handler| handler(&send_data_response_event)),
            Event::AbandonServe(abandon_serve_event) => self
                .abandon_serve_handlers
                .iter()
                .for_each(|handler| handler(&abandon_serve_event)),
            Event::ReceiveMeta(receive_meta_event) => self
                .receive_meta_handlers
                .iter()
                .for_each(|handler| handler(&receive_meta_event)),
            Event::Fatal(fatal_event) => self
                .fatal_handlers
                .iter()
                .for_each(|handler| handler(&fatal_event)),
        }
    }
}

/// Start the event bus thread, which fires handlers for published events until it is told to shut
/// down. Events that were published before the shutdown signal are handled before the thread exits.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => {
                while let Ok(event) = event_subscriber.try_recv() {
                    event_handlers.fire_handlers(event)
                }
                return;
            }
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // The coordinator has stopped publishing. Wait for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }
    })
}
