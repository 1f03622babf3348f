//! Renderer-process delegate: the lifecycle hooks the engine calls.
//!
//! [`RenderDelegate`] owns everything scoped to a script context or a frame:
//! the intercept [`Installation`] per context, the [`FocusTracker`] per
//! (browser, frame), and the [`RendererRouter`] that carries focus
//! notifications and query traffic to the controller.
//!
//! The engine must call [`RenderDelegate::on_context_created`] exactly once
//! before any script runs in a context and
//! [`RenderDelegate::on_context_released`] exactly once when it goes away.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sandpit_bridge::{
    BrowserId, ChannelKey, ContextKey, Envelope, EnvelopeSender, ProcessMessage, QueryResult,
    QueryResultCallback, RendererRouter,
};
use sandpit_config::{Config, InstallMode};
use sandpit_intercept::{
    FileTrapSink, Installation, NativeFn, ObjectRef, ProxyInstaller, ScriptError, ScriptObject,
    ScriptValue, TrapSink,
};

use crate::focus::{FocusState, FocusTracker};
use crate::host::{DomNode, Frame, ScriptContextHost};

/// A script callback waiting to run outside the router lock.
struct Delivery {
    function: ObjectRef,
    args: Vec<ScriptValue>,
}

type DeliveryQueue = Mutex<VecDeque<Delivery>>;

struct FrameState {
    focus: FocusTracker,
    contexts: usize,
}

/// Renderer-side integration of interception, focus tracking and the bridge.
pub struct RenderDelegate {
    config: Config,
    sink: Arc<dyn TrapSink>,
    installer: ProxyInstaller,
    router: Arc<Mutex<RendererRouter>>,
    deliveries: Arc<DeliveryQueue>,
    frames: HashMap<ChannelKey, FrameState>,
    installations: HashMap<ContextKey, Installation>,
}

impl RenderDelegate {
    /// Create a delegate that appends trap records to `intercept.log_path`.
    pub fn new(config: Config, outbound: EnvelopeSender) -> Self {
        let sink: Arc<dyn TrapSink> =
            Arc::new(FileTrapSink::new(config.intercept.log_path.clone()));
        Self::with_sink(config, sink, outbound)
    }

    /// Create a delegate with an explicit trap sink.
    pub fn with_sink(config: Config, sink: Arc<dyn TrapSink>, outbound: EnvelopeSender) -> Self {
        let installer = ProxyInstaller::new(
            config.intercept.function_name.clone(),
            config.intercept.target_object.clone(),
            Arc::clone(&sink),
        );
        Self {
            config,
            sink,
            installer,
            router: Arc::new(Mutex::new(RendererRouter::new(outbound))),
            deliveries: Arc::new(Mutex::new(VecDeque::new())),
            frames: HashMap::new(),
            installations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn TrapSink> {
        &self.sink
    }

    pub fn installer(&self) -> &ProxyInstaller {
        &self.installer
    }

    /// The installation made for a context, if interception is enabled.
    pub fn installation(&self, key: ContextKey) -> Option<&Installation> {
        self.installations.get(&key)
    }

    /// Focus state of a frame with at least one live context.
    pub fn focus_state(&self, key: ChannelKey) -> Option<FocusState> {
        self.frames.get(&key).map(|state| state.focus.state())
    }

    pub fn is_context_alive(&self, key: ContextKey) -> bool {
        self.router.lock().is_context_alive(key)
    }

    /// Issue a query from native code on behalf of a context.
    pub fn send_query(
        &self,
        key: ContextKey,
        request: impl Into<String>,
        persistent: bool,
        callback: QueryResultCallback,
    ) -> Option<u64> {
        let mut router = self.router.lock();
        let request_id = router.send_query(key, request, persistent, callback);
        router.flush();
        request_id
    }

    pub fn cancel_query(&self, key: ContextKey, request_id: u64) -> bool {
        let mut router = self.router.lock();
        let cancelled = router.cancel_query(key, request_id);
        router.flush();
        cancelled
    }

    pub fn pending_query_count(&self, key: ContextKey) -> usize {
        self.router.lock().pending_query_count(key)
    }

    /// A script context became available.
    ///
    /// Opens routing for the context, exposes the query functions, and
    /// installs interception according to `intercept.mode`.
    pub fn on_context_created(
        &mut self,
        browser: BrowserId,
        frame: &dyn Frame,
        context: &dyn ScriptContextHost,
    ) {
        let key = ContextKey::new(browser, frame.id(), context.id());
        if self.installations.contains_key(&key) || self.router.lock().is_context_alive(key) {
            log::warn!("RenderDelegate: context {:?} created twice, ignoring", key);
            return;
        }
        log::info!("RenderDelegate: context created {:?} ({})", key, frame.url());

        self.router.lock().on_context_created(key);
        self.frames
            .entry(key.channel())
            .or_insert_with(|| FrameState {
                focus: FocusTracker::new(),
                contexts: 0,
            })
            .contexts += 1;

        context.register_function(
            &self.config.bridge.query_function,
            query_function(
                Arc::downgrade(&self.router),
                Arc::downgrade(&self.deliveries),
                key,
            ),
        );
        context.register_function(
            &self.config.bridge.cancel_function,
            cancel_function(Arc::downgrade(&self.router), key),
        );

        if !self.config.intercept.enabled {
            log::debug!("RenderDelegate: interception disabled");
            return;
        }
        let installation = match self.config.intercept.mode {
            InstallMode::Native => self.installer.install(context),
            InstallMode::Script => self.installer.install_with_script(context, frame),
        };
        self.installations.insert(key, installation);
    }

    /// A script context is going away.
    ///
    /// Revokes its interception, cancels its queries, and drops the frame's
    /// focus state and channel with its last context.
    pub fn on_context_released(
        &mut self,
        browser: BrowserId,
        frame: &dyn Frame,
        context: &dyn ScriptContextHost,
    ) {
        let key = ContextKey::new(browser, frame.id(), context.id());
        if !self.router.lock().is_context_alive(key) {
            log::debug!("RenderDelegate: release for unknown context {:?}", key);
            return;
        }
        if let Some(installation) = self.installations.remove(&key) {
            installation.revoke();
        }
        {
            let mut router = self.router.lock();
            router.on_context_released(key);
            router.flush();
        }

        let channel = key.channel();
        if let Some(state) = self.frames.get_mut(&channel) {
            state.contexts = state.contexts.saturating_sub(1);
            if state.contexts == 0 {
                self.frames.remove(&channel);
            }
        }
        log::info!("RenderDelegate: context released {:?}", key);
    }

    /// Focus moved within a frame. `node` is `None` when nothing is focused.
    ///
    /// Sends `FocusedNodeChanged` to the controller on editability
    /// transitions only. Frames without a live context are ignored.
    pub fn on_focused_node_changed(
        &mut self,
        browser: BrowserId,
        frame: &dyn Frame,
        node: Option<&dyn DomNode>,
    ) {
        let key = ChannelKey {
            browser,
            frame: frame.id(),
        };
        let Some(state) = self.frames.get_mut(&key) else {
            log::trace!("RenderDelegate: focus change in untracked {:?}", key);
            return;
        };
        if let Some(is_editable) = state.focus.on_focused_node_changed(node) {
            let router = self.router.lock();
            router.notify(key, ProcessMessage::FocusedNodeChanged { is_editable });
            router.flush();
        }
    }

    /// A message arrived from the controller.
    ///
    /// Query responses are routed to their callbacks; script callbacks run
    /// after routing completes. Returns `true` if the message was handled.
    pub fn on_process_message_received(&mut self, envelope: Envelope) -> bool {
        let handled = self.router.lock().on_process_message_received(envelope);
        self.run_deliveries();
        handled
    }

    fn run_deliveries(&self) {
        loop {
            let Some(delivery) = self.deliveries.lock().pop_front() else {
                break;
            };
            if let Err(e) = delivery
                .function
                .call(&ScriptValue::Undefined, &delivery.args)
            {
                log::debug!("RenderDelegate: query callback threw: {}", e);
            }
        }
    }
}

/// Script-visible query function.
///
/// Takes `{request, persistent, onSuccess, onFailure}` and returns the
/// request id, or `undefined` if the context is gone.
fn query_function(
    router: Weak<Mutex<RendererRouter>>,
    deliveries: Weak<DeliveryQueue>,
    key: ContextKey,
) -> NativeFn {
    Arc::new(
        move |_this: &ScriptValue, args: &[ScriptValue]| -> Result<ScriptValue, ScriptError> {
            let Some(options) = args.first().and_then(ScriptValue::as_object) else {
                return Err(ScriptError::TypeError(
                    "query expects an options object".to_string(),
                ));
            };
            let request = options.get("request").to_log_string();
            let persistent = matches!(options.get("persistent"), ScriptValue::Bool(true));
            let on_success = callable(options, "onSuccess");
            let on_failure = callable(options, "onFailure");

            let Some(router) = router.upgrade() else {
                return Ok(ScriptValue::Undefined);
            };
            let queue = deliveries.clone();
            let callback: QueryResultCallback = Box::new(move |result: QueryResult| {
                let (function, args) = match result {
                    Ok(response) => (on_success.clone(), vec![ScriptValue::from(response)]),
                    Err(e) => (
                        on_failure.clone(),
                        vec![ScriptValue::Number(f64::from(e.code)), ScriptValue::from(e.message)],
                    ),
                };
                if let (Some(function), Some(queue)) = (function, queue.upgrade()) {
                    queue.lock().push_back(Delivery { function, args });
                }
            });

            let request_id = {
                let mut router = router.lock();
                let request_id = router.send_query(key, request, persistent, callback);
                router.flush();
                request_id
            };
            Ok(request_id.map_or(ScriptValue::Undefined, |id| ScriptValue::Number(id as f64)))
        },
    )
}

/// Script-visible cancel function. Takes a request id, returns whether a
/// pending query was cancelled.
fn cancel_function(router: Weak<Mutex<RendererRouter>>, key: ContextKey) -> NativeFn {
    Arc::new(
        move |_this: &ScriptValue, args: &[ScriptValue]| -> Result<ScriptValue, ScriptError> {
            let request_id = match args.first() {
                Some(ScriptValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => *n as u64,
                _ => return Ok(ScriptValue::Bool(false)),
            };
            let cancelled = router.upgrade().is_some_and(|router| {
                let mut router = router.lock();
                let cancelled = router.cancel_query(key, request_id);
                router.flush();
                cancelled
            });
            Ok(ScriptValue::Bool(cancelled))
        },
    )
}

fn callable(options: &ObjectRef, name: &str) -> Option<ObjectRef> {
    options
        .get(name)
        .as_object()
        .filter(|f| f.is_callable())
        .cloned()
}
