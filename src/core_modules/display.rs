// THEORY:
// Workers never touch the display directly. They hand annotated frames to a
// `DisplaySink`, and the in-crate sink, `PanelBus`, keeps exactly one slot per
// panel. Publishing overwrites whatever is in the slot, so a display that falls
// behind only ever sees the newest frame and the stale one is dropped instead of
// queueing up. Each panel has one producer (its worker) and one consumer (the
// display loop).

use crate::core_modules::source::Frame;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// One sampled, annotated frame ready for presentation.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub panel: usize,
    /// Decode index of the frame within its source.
    pub frame_index: u64,
    pub image: Frame,
}

/// Receives annotated frames for presentation. Must not block the caller.
pub trait DisplaySink: Send + Sync {
    fn publish(&self, panel: usize, frame: AnnotatedFrame);
}

type Slot = Option<Arc<AnnotatedFrame>>;

/// Single-slot mailboxes, one per display panel.
#[derive(Debug, Clone)]
pub struct PanelBus {
    slots: Arc<Vec<watch::Sender<Slot>>>,
}

impl PanelBus {
    pub fn new(panels: usize) -> Self {
        let slots = (0..panels.max(1))
            .map(|_| watch::channel::<Slot>(None).0)
            .collect();
        Self {
            slots: Arc::new(slots),
        }
    }

    pub fn panel_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the consuming end of `panel`, or `None` if it does not exist.
    ///
    /// A frame already sitting in the slot counts as unseen for the new
    /// receiver.
    pub fn subscribe(&self, panel: usize) -> Option<PanelReceiver> {
        self.slots.get(panel).map(|tx| {
            let mut rx = tx.subscribe();
            if rx.borrow().is_some() {
                rx.mark_changed();
            }
            PanelReceiver { panel, rx }
        })
    }

    /// Newest frame in `panel` without consuming it.
    pub fn latest(&self, panel: usize) -> Option<Arc<AnnotatedFrame>> {
        self.slots.get(panel).and_then(|tx| tx.borrow().clone())
    }
}

impl DisplaySink for PanelBus {
    fn publish(&self, panel: usize, frame: AnnotatedFrame) {
        match self.slots.get(panel) {
            Some(tx) => {
                // Overwrite even with nobody subscribed yet.
                tx.send_replace(Some(Arc::new(frame)));
            }
            None => warn!(panel, panels = self.slots.len(), "no display panel, dropping frame"),
        }
    }
}

/// Consumer side of one panel.
#[derive(Debug)]
pub struct PanelReceiver {
    panel: usize,
    rx: watch::Receiver<Slot>,
}

impl PanelReceiver {
    pub fn panel(&self) -> usize {
        self.panel
    }

    /// Takes the newest frame if one arrived since the last call.
    pub fn take_latest(&mut self) -> Option<Arc<AnnotatedFrame>> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// Waits for the next frame. Returns `None` once the bus is gone.
    pub async fn next_frame(&mut self) -> Option<Arc<AnnotatedFrame>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }
}
