//! Controller-side message router.
//!
//! [`ControllerRouter`] receives envelopes from the renderer, hands queries
//! to registered [`QueryHandler`]s, and forwards focus notifications to the
//! owner as [`ControllerEvent`]s. Handlers answer through a
//! [`QueryCallback`], which may be completed from any thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::channel::EnvelopeSender;
use crate::protocol::{
    BrowserId, ChannelKey, ContextId, Envelope, FrameId, ProcessMessage, UNHANDLED_QUERY_CODE,
    UNHANDLED_QUERY_MESSAGE,
};

/// Events surfaced to the owner of the controller router.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The renderer reported a focus editability transition.
    FocusedNodeChanged {
        browser: BrowserId,
        frame: FrameId,
        is_editable: bool,
    },
}

/// Handles queries issued from script.
pub trait QueryHandler: Send + Sync {
    /// Return `true` to accept the query. Accepted queries must eventually be
    /// answered through `callback` unless they are cancelled first.
    fn on_query(
        &self,
        browser: BrowserId,
        frame: FrameId,
        query_id: u64,
        request: &str,
        persistent: bool,
        callback: QueryCallback,
    ) -> bool;

    /// The query was cancelled by the renderer or the browser closed. The
    /// callback handed out for it is already inert.
    fn on_query_canceled(&self, _browser: BrowserId, _frame: FrameId, _query_id: u64) {}
}

struct CallbackState {
    key: ChannelKey,
    context: ContextId,
    request_id: u64,
    query_id: u64,
    persistent: bool,
    tx: EnvelopeSender,
    done: AtomicBool,
    table: Weak<Mutex<PendingTable>>,
}

impl CallbackState {
    fn finish(&self) -> bool {
        !self.done.swap(true, Ordering::AcqRel)
    }

    fn forget(&self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().remove(&self.query_id);
        }
    }

    fn send(&self, message: ProcessMessage) {
        if self.tx.send(Envelope::new(self.key, message)).is_err() {
            log::debug!(
                "QueryCallback: renderer gone, dropping response to query {}",
                self.query_id
            );
        }
    }
}

/// Responder for one accepted query.
///
/// Cloneable and `Send`, so handlers can answer from another task. Once the
/// query completes or is cancelled every method is a no-op returning `false`.
#[derive(Clone)]
pub struct QueryCallback {
    state: Arc<CallbackState>,
}

impl QueryCallback {
    pub fn query_id(&self) -> u64 {
        self.state.query_id
    }

    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    /// Send a successful response. Completes one-shot queries.
    pub fn success(&self, response: impl Into<String>) -> bool {
        if self.is_done() {
            return false;
        }
        if !self.state.persistent && !self.state.finish() {
            return false;
        }
        self.state.send(ProcessMessage::QuerySuccess {
            context: self.state.context,
            request_id: self.state.request_id,
            response: response.into(),
        });
        if !self.state.persistent {
            self.state.forget();
        }
        true
    }

    /// Send a failure. Always completes the query.
    pub fn failure(&self, error_code: i32, error_message: impl Into<String>) -> bool {
        if !self.state.finish() {
            return false;
        }
        self.state.send(ProcessMessage::QueryFailure {
            context: self.state.context,
            request_id: self.state.request_id,
            error_code,
            error_message: error_message.into(),
        });
        self.state.forget();
        true
    }
}

struct PendingEntry {
    browser: BrowserId,
    frame: FrameId,
    handler: Arc<dyn QueryHandler>,
    state: Arc<CallbackState>,
}

type PendingTable = HashMap<u64, PendingEntry>;

/// Routes renderer traffic on the controller side.
pub struct ControllerRouter {
    outbound: EnvelopeSender,
    events: mpsc::UnboundedSender<ControllerEvent>,
    handlers: Vec<Arc<dyn QueryHandler>>,
    pending: Arc<Mutex<PendingTable>>,
    next_query_id: u64,
}

impl ControllerRouter {
    /// # Arguments
    /// * `outbound` - Envelopes towards the renderer.
    /// * `events` - Receives focus notifications.
    pub fn new(
        outbound: EnvelopeSender,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Self {
        Self {
            outbound,
            events,
            handlers: Vec::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_query_id: 1,
        }
    }

    /// Register a handler. Handlers are tried in registration order.
    pub fn add_handler(&mut self, handler: Arc<dyn QueryHandler>) {
        if !self.handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            self.handlers.push(handler);
        }
    }

    /// Unregister a handler, cancelling the queries it accepted.
    pub fn remove_handler(&mut self, handler: &Arc<dyn QueryHandler>) {
        self.handlers.retain(|h| !Arc::ptr_eq(h, handler));
        self.cancel_where(|entry| Arc::ptr_eq(&entry.handler, handler));
    }

    /// Number of accepted queries still awaiting completion.
    pub fn pending_query_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cancel every pending query belonging to `browser`.
    ///
    /// Call when the browser closes or its renderer process goes away.
    pub fn on_browser_closed(&mut self, browser: BrowserId) {
        let cancelled = self.cancel_where(|entry| entry.browser == browser);
        if cancelled > 0 {
            log::debug!(
                "ControllerRouter: cancelled {} queries for closed {}",
                cancelled,
                browser
            );
        }
    }

    /// Deliver a message from the renderer.
    ///
    /// Returns `true` if the message belongs to the router.
    pub fn on_process_message_received(&mut self, envelope: Envelope) -> bool {
        let Envelope {
            browser,
            frame,
            message,
        } = envelope;
        match message {
            ProcessMessage::FocusedNodeChanged { is_editable } => {
                log::debug!(
                    "ControllerRouter: focus editable={} in {} {}",
                    is_editable,
                    browser,
                    frame
                );
                let _ = self.events.send(ControllerEvent::FocusedNodeChanged {
                    browser,
                    frame,
                    is_editable,
                });
                true
            }
            ProcessMessage::Query {
                context,
                request_id,
                request,
                persistent,
            } => {
                self.dispatch_query(
                    ChannelKey { browser, frame },
                    context,
                    request_id,
                    &request,
                    persistent,
                );
                true
            }
            ProcessMessage::QueryCancel {
                context,
                request_id,
            } => {
                self.cancel_where(|entry| {
                    entry.browser == browser
                        && entry.frame == frame
                        && entry.state.context == context
                        && entry.state.request_id == request_id
                });
                true
            }
            ProcessMessage::QuerySuccess { .. } | ProcessMessage::QueryFailure { .. } => false,
        }
    }

    fn dispatch_query(
        &mut self,
        key: ChannelKey,
        context: ContextId,
        request_id: u64,
        request: &str,
        persistent: bool,
    ) {
        let query_id = self.next_query_id;
        self.next_query_id += 1;

        for handler in self.handlers.clone() {
            let state = Arc::new(CallbackState {
                key,
                context,
                request_id,
                query_id,
                persistent,
                tx: self.outbound.clone(),
                done: AtomicBool::new(false),
                table: Arc::downgrade(&self.pending),
            });
            // Insert before dispatch: the handler may complete synchronously.
            self.pending.lock().insert(
                query_id,
                PendingEntry {
                    browser: key.browser,
                    frame: key.frame,
                    handler: Arc::clone(&handler),
                    state: Arc::clone(&state),
                },
            );

            let callback = QueryCallback {
                state: Arc::clone(&state),
            };
            if handler.on_query(key.browser, key.frame, query_id, request, persistent, callback) {
                log::trace!("ControllerRouter: query {} accepted", query_id);
                return;
            }
            state.done.store(true, Ordering::Release);
            self.pending.lock().remove(&query_id);
        }

        log::debug!(
            "ControllerRouter: no handler for query {} from {}",
            query_id,
            context
        );
        let _ = self.outbound.send(Envelope::new(
            key,
            ProcessMessage::QueryFailure {
                context,
                request_id,
                error_code: UNHANDLED_QUERY_CODE,
                error_message: UNHANDLED_QUERY_MESSAGE.to_string(),
            },
        ));
    }

    fn cancel_where(&mut self, predicate: impl Fn(&PendingEntry) -> bool) -> usize {
        let cancelled: Vec<(u64, PendingEntry)> = {
            let mut table = self.pending.lock();
            let ids: Vec<u64> = table
                .iter()
                .filter(|(_, entry)| predicate(entry))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| table.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        // Handlers run outside the lock; they may touch other callbacks.
        for (query_id, entry) in &cancelled {
            entry.state.done.store(true, Ordering::Release);
            entry
                .handler
                .on_query_canceled(entry.browser, entry.frame, *query_id);
        }
        cancelled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ProcessLink;

    #[derive(Default)]
    struct Keep {
        callbacks: Mutex<Vec<QueryCallback>>,
        canceled: Mutex<Vec<u64>>,
    }

    impl QueryHandler for Keep {
        fn on_query(
            &self,
            _browser: BrowserId,
            _frame: FrameId,
            _query_id: u64,
            request: &str,
            _persistent: bool,
            callback: QueryCallback,
        ) -> bool {
            if request.starts_with("keep:") {
                self.callbacks.lock().push(callback);
                true
            } else {
                false
            }
        }

        fn on_query_canceled(&self, _browser: BrowserId, _frame: FrameId, query_id: u64) {
            self.canceled.lock().push(query_id);
        }
    }

    struct Echo;

    impl QueryHandler for Echo {
        fn on_query(
            &self,
            _browser: BrowserId,
            _frame: FrameId,
            _query_id: u64,
            request: &str,
            _persistent: bool,
            callback: QueryCallback,
        ) -> bool {
            callback.success(format!("echo:{request}"))
        }
    }

    fn query(request_id: u64, request: &str, persistent: bool) -> Envelope {
        Envelope {
            browser: BrowserId(1),
            frame: FrameId(2),
            message: ProcessMessage::Query {
                context: ContextId(3),
                request_id,
                request: request.to_string(),
                persistent,
            },
        }
    }

    fn router() -> (
        ControllerRouter,
        crate::channel::LinkEnd,
        mpsc::UnboundedReceiver<ControllerEvent>,
    ) {
        let (renderer, controller) = ProcessLink::pair();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (ControllerRouter::new(controller.tx, events_tx), renderer, events_rx)
    }

    #[test]
    fn test_focus_notification_becomes_event() {
        let (mut router, _renderer, mut events) = router();
        assert!(router.on_process_message_received(Envelope {
            browser: BrowserId(1),
            frame: FrameId(2),
            message: ProcessMessage::FocusedNodeChanged { is_editable: true },
        }));
        assert_eq!(
            events.try_recv().expect("event"),
            ControllerEvent::FocusedNodeChanged {
                browser: BrowserId(1),
                frame: FrameId(2),
                is_editable: true
            }
        );
    }

    #[test]
    fn test_unhandled_query_fails_with_minus_one() {
        let (mut router, mut renderer, _events) = router();
        router.on_process_message_received(query(9, "nobody", false));
        assert_eq!(
            renderer.rx.try_recv().expect("failure").message,
            ProcessMessage::QueryFailure {
                context: ContextId(3),
                request_id: 9,
                error_code: UNHANDLED_QUERY_CODE,
                error_message: UNHANDLED_QUERY_MESSAGE.to_string(),
            }
        );
        assert_eq!(router.pending_query_count(), 0);
    }

    #[test]
    fn test_handlers_tried_in_order() {
        let (mut router, mut renderer, _events) = router();
        let keep = Arc::new(Keep::default());
        router.add_handler(keep.clone());
        router.add_handler(Arc::new(Echo));

        router.on_process_message_received(query(1, "hello", false));
        assert_eq!(
            renderer.rx.try_recv().expect("success").message,
            ProcessMessage::QuerySuccess {
                context: ContextId(3),
                request_id: 1,
                response: "echo:hello".to_string(),
            }
        );
        // Synchronous one-shot success leaves nothing pending.
        assert_eq!(router.pending_query_count(), 0);

        router.on_process_message_received(query(2, "keep:me", false));
        assert_eq!(router.pending_query_count(), 1);
        assert!(renderer.rx.try_recv().is_err());
    }

    #[test]
    fn test_one_shot_callback_completes_once() {
        let (mut router, mut renderer, _events) = router();
        let keep = Arc::new(Keep::default());
        router.add_handler(keep.clone());
        router.on_process_message_received(query(1, "keep:1", false));

        let callback = keep.callbacks.lock()[0].clone();
        assert!(callback.success("first"));
        assert!(!callback.success("second"));
        assert!(!callback.failure(1, "late"));
        assert!(callback.is_done());
        assert_eq!(router.pending_query_count(), 0);

        assert!(renderer.rx.try_recv().is_ok());
        assert!(renderer.rx.try_recv().is_err());
    }

    #[test]
    fn test_persistent_callback_until_failure() {
        let (mut router, mut renderer, _events) = router();
        let keep = Arc::new(Keep::default());
        router.add_handler(keep.clone());
        router.on_process_message_received(query(1, "keep:stream", true));

        let callback = keep.callbacks.lock()[0].clone();
        assert!(callback.success("a"));
        assert!(callback.success("b"));
        assert_eq!(router.pending_query_count(), 1);
        assert!(callback.failure(0, "closed"));
        assert!(!callback.success("c"));
        assert_eq!(router.pending_query_count(), 0);

        let received: Vec<_> = std::iter::from_fn(|| renderer.rx.try_recv().ok()).collect();
        assert_eq!(received.len(), 3);
    }

    #[test]
    fn test_renderer_cancel_reaches_handler_and_silences_callback() {
        let (mut router, mut renderer, _events) = router();
        let keep = Arc::new(Keep::default());
        router.add_handler(keep.clone());
        router.on_process_message_received(query(5, "keep:x", true));
        let callback = keep.callbacks.lock()[0].clone();

        router.on_process_message_received(Envelope {
            browser: BrowserId(1),
            frame: FrameId(2),
            message: ProcessMessage::QueryCancel {
                context: ContextId(3),
                request_id: 5,
            },
        });
        assert_eq!(*keep.canceled.lock(), vec![callback.query_id()]);
        assert!(!callback.success("too late"));
        assert!(renderer.rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_is_scoped_to_its_frame() {
        let (mut router, _renderer, _events) = router();
        let keep = Arc::new(Keep::default());
        router.add_handler(keep.clone());

        // Same context and request ids, issued from two frames.
        router.on_process_message_received(query(1, "keep:here", true));
        let mut elsewhere = query(1, "keep:there", true);
        elsewhere.frame = FrameId(4);
        router.on_process_message_received(elsewhere);
        assert_eq!(router.pending_query_count(), 2);
        let callbacks = keep.callbacks.lock().clone();

        router.on_process_message_received(Envelope {
            browser: BrowserId(1),
            frame: FrameId(4),
            message: ProcessMessage::QueryCancel {
                context: ContextId(3),
                request_id: 1,
            },
        });
        assert_eq!(router.pending_query_count(), 1);
        assert_eq!(*keep.canceled.lock(), vec![callbacks[1].query_id()]);
        assert!(callbacks[0].success("still open"));
    }

    #[test]
    fn test_browser_closed_cancels_only_that_browser() {
        let (mut router, _renderer, _events) = router();
        let keep = Arc::new(Keep::default());
        router.add_handler(keep.clone());
        router.on_process_message_received(query(1, "keep:a", false));
        let mut other = query(2, "keep:b", false);
        other.browser = BrowserId(7);
        router.on_process_message_received(other);
        assert_eq!(router.pending_query_count(), 2);

        router.on_browser_closed(BrowserId(1));
        assert_eq!(router.pending_query_count(), 1);
        assert_eq!(keep.canceled.lock().len(), 1);
    }

    #[test]
    fn test_remove_handler_cancels_its_queries() {
        let (mut router, _renderer, _events) = router();
        let keep = Arc::new(Keep::default());
        let as_handler: Arc<dyn QueryHandler> = keep.clone();
        router.add_handler(Arc::clone(&as_handler));
        router.on_process_message_received(query(1, "keep:a", false));

        router.remove_handler(&as_handler);
        assert_eq!(router.pending_query_count(), 0);
        assert_eq!(keep.canceled.lock().len(), 1);
    }
}
