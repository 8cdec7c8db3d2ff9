// src/acquisition/render.rs
//! Progress hooks for whatever displays the acquisition

use crate::acquisition::session::SessionSnapshot;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

/// Receives session snapshots at the refresh cadence and once at completion
pub trait Renderer {
    fn on_progress(&mut self, snapshot: &SessionSnapshot);

    fn on_complete(&mut self, snapshot: &SessionSnapshot) {
        self.on_progress(snapshot);
    }
}

impl<R: Renderer + ?Sized> Renderer for &mut R {
    fn on_progress(&mut self, snapshot: &SessionSnapshot) {
        (**self).on_progress(snapshot)
    }

    fn on_complete(&mut self, snapshot: &SessionSnapshot) {
        (**self).on_complete(snapshot)
    }
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn on_progress(&mut self, _snapshot: &SessionSnapshot) {}

    fn on_complete(&mut self, _snapshot: &SessionSnapshot) {}
}

/// Reports progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRenderer;

impl LogRenderer {
    fn latest_envelope(snapshot: &SessionSnapshot) -> Vec<f64> {
        snapshot
            .envelopes
            .iter()
            .map(|e| e.last().copied().unwrap_or(0.0))
            .collect()
    }
}

impl Renderer for LogRenderer {
    fn on_progress(&mut self, snapshot: &SessionSnapshot) {
        let percent = snapshot.progress().map(|p| (p * 100.0).round());
        info!(
            samples = snapshot.len(),
            progress_percent = ?percent,
            envelope = ?Self::latest_envelope(snapshot),
            frames_invalid = snapshot.stats.frames_invalid,
            "acquisition progress"
        );
    }

    fn on_complete(&mut self, snapshot: &SessionSnapshot) {
        info!(
            state = ?snapshot.state,
            samples = snapshot.len(),
            frames_valid = snapshot.stats.frames_valid,
            frames_invalid = snapshot.stats.frames_invalid,
            "acquisition complete"
        );
    }
}

/// Notification forwarded by [`ChannelRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Progress(SessionSnapshot),
    Complete(SessionSnapshot),
}

/// Forwards snapshots to another thread over a crossbeam channel
///
/// Never blocks the acquisition loop: a full channel drops the progress
/// snapshot and the consumer sees the next one.
#[derive(Debug, Clone)]
pub struct ChannelRenderer {
    tx: Sender<RenderEvent>,
}

impl ChannelRenderer {
    pub fn new(tx: Sender<RenderEvent>) -> Self {
        Self { tx }
    }

    pub fn unbounded() -> (Self, Receiver<RenderEvent>) {
        let (tx, rx) = channel::unbounded();
        (Self::new(tx), rx)
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<RenderEvent>) {
        let (tx, rx) = channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    fn forward(&self, event: RenderEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                debug!("render channel disconnected");
                false
            }
        }
    }
}

impl Renderer for ChannelRenderer {
    fn on_progress(&mut self, snapshot: &SessionSnapshot) {
        if !self.forward(RenderEvent::Progress(snapshot.clone())) {
            debug!(samples = snapshot.len(), "progress snapshot dropped");
        }
    }

    fn on_complete(&mut self, snapshot: &SessionSnapshot) {
        if !self.forward(RenderEvent::Complete(snapshot.clone())) {
            warn!("completion snapshot could not be delivered");
        }
    }
}
