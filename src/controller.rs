//! Controller loop over a JSON-lines byte stream.
//!
//! Used by `sandpit controller`: envelopes from a renderer arrive on one
//! stream, responses leave on the other. Queries are answered by
//! [`EchoHandler`]; focus notifications are logged.

use std::collections::HashSet;

use anyhow::{Context, Result};
use sandpit_bridge::{
    BrowserId, ControllerEvent, ControllerRouter, FrameId, QueryCallback, QueryHandler,
    read_envelopes, write_envelopes,
};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;

/// Answers every query with its own request text.
#[derive(Debug, Default)]
pub struct EchoHandler;

impl QueryHandler for EchoHandler {
    fn on_query(
        &self,
        browser: BrowserId,
        frame: FrameId,
        query_id: u64,
        request: &str,
        _persistent: bool,
        callback: QueryCallback,
    ) -> bool {
        log::debug!(
            "EchoHandler: query {} from {} {}: {:?}",
            query_id,
            browser,
            frame,
            request
        );
        callback.success(request)
    }
}

/// Summary of a finished controller session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub received: usize,
    pub sent: usize,
    pub focus_events: usize,
}

/// Run a controller until `reader` hits EOF.
///
/// Pending queries of every browser seen are cancelled at EOF, and the
/// writer is drained before returning.
pub async fn run_controller<R, W>(reader: R, writer: W) -> Result<SessionStats>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, mut in_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let writer_task = tokio::spawn(write_envelopes(writer, out_rx));
    let reader_task = tokio::spawn(read_envelopes(reader, in_tx));

    let mut router = ControllerRouter::new(out_tx, events_tx);
    router.add_handler(std::sync::Arc::new(EchoHandler));

    let mut browsers = HashSet::new();
    let mut stats = SessionStats::default();
    while let Some(envelope) = in_rx.recv().await {
        browsers.insert(envelope.browser);
        let name = envelope.message.name();
        if !router.on_process_message_received(envelope) {
            log::debug!("controller: ignoring {}", name);
        }
        while let Ok(ControllerEvent::FocusedNodeChanged {
            browser,
            frame,
            is_editable,
        }) = events_rx.try_recv()
        {
            log::info!(
                "controller: focus in {} {} is now {}",
                browser,
                frame,
                if is_editable { "editable" } else { "not editable" }
            );
            stats.focus_events += 1;
        }
    }

    stats.received = reader_task
        .await
        .context("reader task panicked")?
        .context("reading envelopes")?;

    for browser in browsers {
        router.on_browser_closed(browser);
    }
    drop(router);

    stats.sent = writer_task
        .await
        .context("writer task panicked")?
        .context("writing envelopes")?;
    log::info!(
        "controller: session done ({} in, {} out, {} focus events)",
        stats.received,
        stats.sent,
        stats.focus_events
    );
    Ok(stats)
}
