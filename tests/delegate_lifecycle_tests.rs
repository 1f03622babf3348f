//! Render delegate lifecycle: installation, teardown and query routing.

mod common;

use std::sync::Arc;

use common::{FakeContext, FakeFrame, config_with_tmp_log};
use parking_lot::Mutex;
use sandpit::RenderDelegate;
use sandpit::controller::EchoHandler;
use sandpit_bridge::{
    BrowserId, ContextId, ContextKey, ControllerRouter, FrameId, ProcessLink, ProcessMessage,
    QueryResult,
};
use sandpit_config::InstallMode;
use sandpit_intercept::{
    MemoryTrapSink, NativeFn, ScriptError, ScriptObject, ScriptValue, TrapKind, TrapSink,
};
use tokio::sync::mpsc;

fn key(frame: i64, context: u64) -> ContextKey {
    ContextKey::new(BrowserId(1), FrameId(frame), ContextId(context))
}

#[test]
fn test_native_install_writes_trap_log() {
    let (config, _dir) = config_with_tmp_log();
    let log_path = config.intercept.log_path.clone();
    let (renderer, _controller) = ProcessLink::pair();
    let mut delegate = RenderDelegate::new(config, renderer.tx);
    let frame = FakeFrame::new(1);
    let context = FakeContext::with_chrome(1);

    delegate.on_context_created(BrowserId(1), &frame, &context);
    assert!(
        delegate
            .installation(key(1, 1))
            .is_some_and(|installation| installation.is_proxied())
    );

    let chrome = context.object("chrome");
    chrome.has("runtime");
    let _ = context.call(
        "chromeIntercept",
        &[ScriptValue::from("ownKeys"), ScriptValue::from("a")],
    );

    let contents = std::fs::read_to_string(&log_path).expect("trap log");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(
        lines,
        vec![
            "targetKeys: [chrome] |app|, |runtime|, |loadTimes|, |csi|, ",
            "has: [chrome] |runtime|, ",
            "ownKeys: [chrome] |a|, ",
        ]
    );
}

#[test]
fn test_script_mode_runs_bootstrap_in_frame() {
    let (mut config, _dir) = config_with_tmp_log();
    config.intercept.mode = InstallMode::Script;
    let (renderer, _controller) = ProcessLink::pair();
    let mut delegate =
        RenderDelegate::with_sink(config, Arc::new(MemoryTrapSink::new()), renderer.tx);
    let frame = FakeFrame::new(1);
    let context = FakeContext::with_chrome(1);

    delegate.on_context_created(BrowserId(1), &frame, &context);

    let scripts = frame.scripts.lock();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0], delegate.installer().bootstrap_script());
    assert!(context.object("chromeIntercept").is_callable());
}

#[test]
fn test_traps_after_release_are_dropped() {
    let sink = Arc::new(MemoryTrapSink::new());
    let (config, _dir) = config_with_tmp_log();
    let (renderer, _controller) = ProcessLink::pair();
    let mut delegate =
        RenderDelegate::with_sink(config, sink.clone() as Arc<dyn TrapSink>, renderer.tx);
    let frame = FakeFrame::new(1);
    let context = FakeContext::with_chrome(1);

    delegate.on_context_created(BrowserId(1), &frame, &context);
    let chrome = context.object("chrome");
    chrome.get("app");
    assert_eq!(sink.len(), 2);

    delegate.on_context_released(BrowserId(1), &frame, &context);
    assert!(delegate.installation(key(1, 1)).is_none());

    // Script still holding the proxy keeps working, silently.
    assert_eq!(chrome.get("csi"), ScriptValue::from("csi"));
    assert!(chrome.has("app"));
    let result = context
        .call("chromeIntercept", &[ScriptValue::from("get"), ScriptValue::from("x")])
        .expect("call");
    assert_eq!(result, ScriptValue::Undefined);
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.records()[1].kind(), TrapKind::Get);
}

#[test]
fn test_release_cancels_pending_queries() {
    let (config, _dir) = config_with_tmp_log();
    let (renderer, mut controller) = ProcessLink::pair();
    let mut delegate =
        RenderDelegate::with_sink(config, Arc::new(MemoryTrapSink::new()), renderer.tx);
    let frame = FakeFrame::new(1);
    let context = FakeContext::new(1);
    delegate.on_context_created(BrowserId(1), &frame, &context);

    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let request_id = delegate
        .send_query(
            key(1, 1),
            "slow",
            true,
            Box::new(move |_result: QueryResult| *counter.lock() += 1),
        )
        .expect("query sent");
    assert_eq!(delegate.pending_query_count(key(1, 1)), 1);

    delegate.on_context_released(BrowserId(1), &frame, &context);
    assert!(!delegate.is_context_alive(key(1, 1)));

    let messages: Vec<ProcessMessage> = std::iter::from_fn(|| controller.rx.try_recv().ok())
        .map(|envelope| envelope.message)
        .collect();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages[1],
        ProcessMessage::QueryCancel {
            context: ContextId(1),
            request_id,
        }
    );

    // Late answers and new traffic for the dead context go nowhere.
    assert!(delegate.on_process_message_received(sandpit_bridge::Envelope {
        browser: BrowserId(1),
        frame: FrameId(1),
        message: ProcessMessage::QuerySuccess {
            context: ContextId(1),
            request_id,
            response: "late".to_string(),
        },
    }));
    assert_eq!(*calls.lock(), 0);
    assert!(
        delegate
            .send_query(key(1, 1), "again", false, Box::new(|_result: QueryResult| {}))
            .is_none()
    );
    assert!(controller.rx.try_recv().is_err());
}

#[test]
fn test_duplicate_context_creation_is_ignored() {
    let sink = Arc::new(MemoryTrapSink::new());
    let (config, _dir) = config_with_tmp_log();
    let (renderer, _controller) = ProcessLink::pair();
    let mut delegate =
        RenderDelegate::with_sink(config, sink.clone() as Arc<dyn TrapSink>, renderer.tx);
    let frame = FakeFrame::new(1);
    let context = FakeContext::with_chrome(1);

    delegate.on_context_created(BrowserId(1), &frame, &context);
    delegate.on_context_created(BrowserId(1), &frame, &context);

    // One baseline snapshot, and the global is wrapped only once.
    assert_eq!(sink.len(), 1);
    context.object("chrome").get("app");
    assert_eq!(sink.len(), 2);
}

#[test]
fn test_query_round_trip_through_controller() {
    let (config, _dir) = config_with_tmp_log();
    let (renderer, mut controller_end) = ProcessLink::pair();
    let mut renderer_rx = renderer.rx;
    let mut delegate =
        RenderDelegate::with_sink(config, Arc::new(MemoryTrapSink::new()), renderer.tx);
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut controller = ControllerRouter::new(controller_end.tx.clone(), events_tx);
    controller.add_handler(Arc::new(EchoHandler));

    let frame = FakeFrame::new(1);
    let context = FakeContext::new(1);
    delegate.on_context_created(BrowserId(1), &frame, &context);

    let answers = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&answers);
    let on_success: NativeFn = Arc::new(
        move |_this: &ScriptValue, args: &[ScriptValue]| -> Result<ScriptValue, ScriptError> {
            sink.lock().push(args[0].to_log_string());
            Ok(ScriptValue::Undefined)
        },
    );
    let options = sandpit_intercept::HostObject::new()
        .with("request", "hello")
        .with(
            "onSuccess",
            sandpit_intercept::HostObject::function(on_success).into_ref(),
        )
        .into_ref();
    let id = context
        .call("cefQuery", &[ScriptValue::Object(options)])
        .expect("query");
    assert!(matches!(id, ScriptValue::Number(_)));

    while let Ok(envelope) = controller_end.rx.try_recv() {
        controller.on_process_message_received(envelope);
    }
    assert_eq!(controller.pending_query_count(), 0);

    while let Ok(envelope) = renderer_rx.try_recv() {
        assert!(delegate.on_process_message_received(envelope));
    }
    assert_eq!(*answers.lock(), vec!["hello".to_string()]);
    assert_eq!(delegate.pending_query_count(key(1, 1)), 0);
}
