use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use smallvec::SmallVec;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::card::CardModel;
use crate::diff::ChangeType;
use crate::stream::state::{StreamStage, StreamingState};

/// Raw text appended to the session buffer on one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferGrowth {
    pub session: u64,
    pub chunk: String,
    pub buffer_length: usize,
    pub target_length: usize,
}

/// One emitted card snapshot plus its diff against the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdate {
    pub session: u64,
    pub card: Arc<CardModel>,
    pub change_type: ChangeType,
    pub completed_sections: SmallVec<[usize; 4]>,
    pub changed_sections: SmallVec<[usize; 8]>,
    /// Last snapshot of a session that ran to completion.
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub session: u64,
    pub from: StreamStage,
    pub to: StreamStage,
    pub state: StreamingState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AssemblerEvent {
    Buffer(BufferGrowth),
    Card(CardUpdate),
    Stage(StageTransition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Buffer,
    Card,
    Stage,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Buffer, EventKind::Card, EventKind::Stage];
}

impl AssemblerEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            AssemblerEvent::Buffer(_) => EventKind::Buffer,
            AssemblerEvent::Card(_) => EventKind::Card,
            AssemblerEvent::Stage(_) => EventKind::Stage,
        }
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct EventReceiver {
    rx: UnboundedReceiver<AssemblerEvent>,
}

impl EventReceiver {
    /// Next event; `None` once the assembler is gone.
    pub async fn recv(&mut self) -> Option<AssemblerEvent> {
        self.rx.recv().await
    }

    /// Next already-published event, if any.
    pub fn try_recv(&mut self) -> Option<AssemblerEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Every event published so far.
    pub fn drain(&mut self) -> Vec<AssemblerEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

struct Subscriber {
    kinds: SmallVec<[EventKind; 3]>,
    tx: UnboundedSender<AssemblerEvent>,
}

/// Fan-out of assembler events to any number of subscribers.
///
/// Events reach every subscriber in publish order. Publishing never blocks;
/// subscribers whose receiver was dropped are removed on the next publish.
#[derive(Default)]
pub struct UpdateEmitter {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl UpdateEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.subscribe_to(&EventKind::ALL)
    }

    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            kinds: kinds.iter().copied().collect(),
            tx,
        });
        EventReceiver { rx }
    }

    pub fn publish(&self, event: &AssemblerEvent) {
        let kind = event.kind();
        self.subscribers.lock().retain(|subscriber| {
            if !subscriber.kinds.contains(&kind) {
                return !subscriber.tx.is_closed();
            }
            subscriber.tx.send(event.clone()).is_ok()
        });
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for UpdateEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateEmitter")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
