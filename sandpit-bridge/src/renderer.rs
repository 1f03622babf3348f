//! Renderer-side message router.
//!
//! [`RendererRouter`] owns one [`Channel`] per live (browser, frame) and the
//! table of queries each script context is waiting on. The host must call
//! [`RendererRouter::on_context_created`], [`RendererRouter::on_context_released`]
//! and [`RendererRouter::on_process_message_received`] at the matching
//! lifecycle points, and [`RendererRouter::flush`] once it is done issuing
//! sends. Anything still queued when a frame's last context is released is
//! dropped.

use std::collections::HashMap;

use thiserror::Error;

use crate::channel::{Channel, EnvelopeSender};
use crate::protocol::{ChannelKey, ContextKey, Envelope, ProcessId, ProcessMessage};

/// Failure reported by the controller for a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query failed ({code}): {message}")]
pub struct QueryError {
    pub code: i32,
    pub message: String,
}

/// Outcome delivered to a query callback.
pub type QueryResult = Result<String, QueryError>;

/// Invoked once per response. Persistent queries may see many successes.
pub type QueryResultCallback = Box<dyn FnMut(QueryResult) + Send>;

struct PendingQuery {
    persistent: bool,
    callback: QueryResultCallback,
}

struct OpenChannel {
    channel: Channel,
    contexts: usize,
}

/// Routes queries and notifications from script contexts to the controller.
pub struct RendererRouter {
    outbound: EnvelopeSender,
    channels: HashMap<ChannelKey, OpenChannel>,
    contexts: HashMap<ContextKey, HashMap<u64, PendingQuery>>,
    next_request_id: u64,
}

impl RendererRouter {
    /// Create a router whose channels write into `outbound`.
    pub fn new(outbound: EnvelopeSender) -> Self {
        Self {
            outbound,
            channels: HashMap::new(),
            contexts: HashMap::new(),
            next_request_id: 1,
        }
    }

    /// Start routing for a new script context.
    ///
    /// Opens the frame's channel if this is its first live context.
    pub fn on_context_created(&mut self, key: ContextKey) {
        if self.contexts.contains_key(&key) {
            log::warn!("RendererRouter: duplicate context creation for {:?}", key);
            return;
        }
        let outbound = &self.outbound;
        let open = self
            .channels
            .entry(key.channel())
            .or_insert_with(|| OpenChannel {
                channel: Channel::open(key.channel(), ProcessId::Browser, outbound.clone()),
                contexts: 0,
            });
        open.contexts += 1;
        self.contexts.insert(key, HashMap::new());
        log::debug!("RendererRouter: context created {:?}", key);
    }

    /// Stop routing for a script context.
    ///
    /// Its pending queries are cancelled (the controller is told, the
    /// callbacks are dropped unrun). The frame's channel is released with its
    /// last context.
    pub fn on_context_released(&mut self, key: ContextKey) {
        let Some(pending) = self.contexts.remove(&key) else {
            log::debug!("RendererRouter: release for unknown context {:?}", key);
            return;
        };

        let channel_key = key.channel();
        if let Some(open) = self.channels.get_mut(&channel_key) {
            let cancels = pending.keys().map(|request_id| ProcessMessage::QueryCancel {
                context: key.context,
                request_id: *request_id,
            });
            open.contexts = open.contexts.saturating_sub(1);
            if open.contexts == 0 {
                open.channel.release_with(cancels);
                self.channels.remove(&channel_key);
            } else {
                for cancel in cancels {
                    open.channel.send(cancel);
                }
            }
        }
        log::debug!(
            "RendererRouter: context released {:?} ({} pending cancelled)",
            key,
            pending.len()
        );
    }

    pub fn is_context_alive(&self, key: ContextKey) -> bool {
        self.contexts.contains_key(&key)
    }

    /// Issue a query on behalf of a script context.
    ///
    /// Returns the request id, or `None` if the context is not live or the
    /// controller is gone. In that case `callback` is dropped unrun.
    pub fn send_query(
        &mut self,
        key: ContextKey,
        request: impl Into<String>,
        persistent: bool,
        callback: QueryResultCallback,
    ) -> Option<u64> {
        let pending = self.contexts.get_mut(&key)?;
        let channel = &self.channels.get(&key.channel())?.channel;

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let sent = channel.send(ProcessMessage::Query {
            context: key.context,
            request_id,
            request: request.into(),
            persistent,
        });
        if !sent {
            return None;
        }
        pending.insert(
            request_id,
            PendingQuery {
                persistent,
                callback,
            },
        );
        Some(request_id)
    }

    /// Cancel one pending query. Returns `false` if it was not pending.
    pub fn cancel_query(&mut self, key: ContextKey, request_id: u64) -> bool {
        let removed = self
            .contexts
            .get_mut(&key)
            .and_then(|pending| pending.remove(&request_id))
            .is_some();
        if removed && let Some(open) = self.channels.get(&key.channel()) {
            open.channel.send(ProcessMessage::QueryCancel {
                context: key.context,
                request_id,
            });
        }
        removed
    }

    /// Send a one-way notification on the frame's channel.
    ///
    /// Returns `false` (and drops the message) if the frame has no live
    /// context.
    pub fn notify(&self, key: ChannelKey, message: ProcessMessage) -> bool {
        match self.channels.get(&key) {
            Some(open) => open.channel.send(message),
            None => {
                log::trace!(
                    "RendererRouter: no channel for {:?}, dropping {}",
                    key,
                    message.name()
                );
                false
            }
        }
    }

    /// Deliver a message from the controller.
    ///
    /// Returns `true` if the message belongs to the router, whether or not a
    /// live query was found for it.
    pub fn on_process_message_received(&mut self, envelope: Envelope) -> bool {
        let (context, request_id, result) = match envelope.message {
            ProcessMessage::QuerySuccess {
                context,
                request_id,
                response,
            } => (context, request_id, Ok(response)),
            ProcessMessage::QueryFailure {
                context,
                request_id,
                error_code,
                error_message,
            } => (
                context,
                request_id,
                Err(QueryError {
                    code: error_code,
                    message: error_message,
                }),
            ),
            _ => return false,
        };

        let key = ContextKey::new(envelope.browser, envelope.frame, context);
        let Some(pending) = self.contexts.get_mut(&key) else {
            log::trace!("RendererRouter: response for released context {:?}", key);
            return true;
        };

        let keep = matches!(
            (&result, pending.get(&request_id)),
            (Ok(_), Some(query)) if query.persistent
        );
        if keep {
            if let Some(query) = pending.get_mut(&request_id) {
                (query.callback)(result);
            }
        } else if let Some(mut query) = pending.remove(&request_id) {
            (query.callback)(result);
        } else {
            log::trace!(
                "RendererRouter: response for unknown request {} in {:?}",
                request_id,
                key
            );
        }
        true
    }

    /// Hand every queued message to the controller link.
    ///
    /// Returns the number of envelopes sent.
    pub fn flush(&self) -> usize {
        self.channels.values().map(|open| open.channel.flush()).sum()
    }

    /// Number of queries awaiting a response in a context.
    pub fn pending_query_count(&self, key: ContextKey) -> usize {
        self.contexts.get(&key).map_or(0, HashMap::len)
    }
}
