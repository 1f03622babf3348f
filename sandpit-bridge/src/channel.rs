//! Per-(browser, frame) conduits and the process link they write into.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::protocol::{ChannelKey, Envelope, ProcessId, ProcessMessage};

/// Sending half of a one-directional process link.
pub type EnvelopeSender = mpsc::UnboundedSender<Envelope>;
/// Receiving half of a one-directional process link.
pub type EnvelopeReceiver = mpsc::UnboundedReceiver<Envelope>;

/// Fire-and-forget conduit for one (browser, frame) pair.
///
/// Sends never block and never wait for acknowledgement. They are queued on
/// the channel and reach the link on [`Channel::flush`]. Releasing the
/// channel drops whatever is still queued, and every later send is dropped
/// silently.
#[derive(Debug, Clone)]
pub struct Channel {
    key: ChannelKey,
    peer: ProcessId,
    tx: EnvelopeSender,
    queue: Arc<Mutex<VecDeque<ProcessMessage>>>,
    released: Arc<AtomicBool>,
}

impl Channel {
    /// Open a channel towards `peer` over `tx`.
    pub fn open(key: ChannelKey, peer: ProcessId, tx: EnvelopeSender) -> Self {
        Self {
            key,
            peer,
            tx,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Messages queued and not yet flushed.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Release the channel. Clones share the release.
    ///
    /// Returns the number of queued messages dropped.
    pub fn release(&self) -> usize {
        self.release_with(std::iter::empty())
    }

    /// Release the channel, delivering `farewell` after dropping the queue.
    ///
    /// Used for the cancellations a closing context owes its peer.
    pub fn release_with(&self, farewell: impl IntoIterator<Item = ProcessMessage>) -> usize {
        let dropped = {
            let mut queue = self.queue.lock();
            self.released.store(true, Ordering::Release);
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            log::debug!(
                "Channel {:?}: released with {} queued, dropped",
                self.key,
                dropped
            );
        }
        for message in farewell {
            self.deliver(message);
        }
        dropped
    }

    /// Queue `message` for the peer.
    ///
    /// Returns `false` if the channel was released or the peer hung up; the
    /// message is dropped in both cases.
    pub fn send(&self, message: ProcessMessage) -> bool {
        let mut queue = self.queue.lock();
        if self.is_released() {
            log::trace!(
                "Channel {:?}: released, dropping {}",
                self.key,
                message.name()
            );
            return false;
        }
        if self.tx.is_closed() {
            log::debug!(
                "Channel {:?}: {:?} side closed, dropping {}",
                self.key,
                self.peer,
                message.name()
            );
            return false;
        }
        queue.push_back(message);
        true
    }

    /// Hand every queued message to the link. Returns how many went out.
    pub fn flush(&self) -> usize {
        let mut queue = self.queue.lock();
        let mut sent = 0;
        while let Some(message) = queue.pop_front() {
            if self.deliver(message) {
                sent += 1;
            }
        }
        sent
    }

    fn deliver(&self, message: ProcessMessage) -> bool {
        let name = message.name();
        match self.tx.send(Envelope::new(self.key, message)) {
            Ok(()) => true,
            Err(_) => {
                log::debug!(
                    "Channel {:?}: {:?} side closed, dropping {}",
                    self.key,
                    self.peer,
                    name
                );
                false
            }
        }
    }
}

/// One side of an in-process duplex link between renderer and controller.
pub struct LinkEnd {
    /// Envelopes towards the other side.
    pub tx: EnvelopeSender,
    /// Envelopes from the other side.
    pub rx: EnvelopeReceiver,
}

/// Builds duplex links out of two unbounded channels.
pub struct ProcessLink;

impl ProcessLink {
    /// Returns `(renderer_end, controller_end)`.
    pub fn pair() -> (LinkEnd, LinkEnd) {
        let (to_controller, from_renderer) = mpsc::unbounded_channel();
        let (to_renderer, from_controller) = mpsc::unbounded_channel();
        (
            LinkEnd {
                tx: to_controller,
                rx: from_controller,
            },
            LinkEnd {
                tx: to_renderer,
                rx: from_renderer,
            },
        )
    }
}
