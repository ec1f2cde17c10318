use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::AssemblerError;
use crate::pacing::advance_chars;

#[derive(Debug, Default)]
struct FeedState {
    text: String,
    finished: bool,
    closed: bool,
}

/// Source text of one session, either handed over whole or pushed in
/// pieces by a [`SessionFeeder`].
#[derive(Debug, Default)]
pub(crate) struct FeedSource {
    state: Mutex<FeedState>,
    notify: Notify,
}

/// What a tick took from the source.
#[derive(Debug)]
pub(crate) struct FeedTake {
    pub chunk: String,
    /// Byte offset after `chunk`.
    pub end: usize,
    /// Bytes fed so far.
    pub target_length: usize,
    /// No more text will be fed.
    pub finished: bool,
}

impl FeedSource {
    pub(crate) fn complete(text: String) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FeedState {
                text,
                finished: true,
                closed: false,
            }),
            notify: Notify::new(),
        })
    }

    pub(crate) fn open() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, chunk: &str) -> Result<(), AssemblerError> {
        {
            let mut state = self.state.lock();
            if state.closed || state.finished {
                return Err(AssemblerError::SessionClosed);
            }
            state.text.push_str(chunk);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub(crate) fn finish(&self) {
        self.state.lock().finished = true;
        self.notify.notify_one();
    }

    /// The session is over; further pushes fail.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    pub(crate) fn length(&self) -> (usize, bool) {
        let state = self.state.lock();
        (state.text.len(), state.finished)
    }

    /// Take up to `max_chars` characters from byte `offset`, or everything
    /// available when `max_chars` is `None`.
    pub(crate) fn take(&self, offset: usize, max_chars: Option<usize>) -> FeedTake {
        let state = self.state.lock();
        let start = offset.min(state.text.len());
        let end = match max_chars {
            Some(max) => advance_chars(&state.text, start, max),
            None => state.text.len(),
        };
        FeedTake {
            chunk: state.text.get(start..end).unwrap_or_default().to_string(),
            end,
            target_length: state.text.len(),
            finished: state.finished,
        }
    }

    /// Resolve once text was pushed or the feed finished since the last wait.
    pub(crate) async fn changed(&self) {
        self.notify.notified().await;
    }
}

/// Push handle returned by
/// [`StreamingAssembler::start_incremental`](crate::stream::StreamingAssembler::start_incremental).
#[derive(Debug, Clone)]
pub struct SessionFeeder {
    source: Arc<FeedSource>,
    session: u64,
}

impl SessionFeeder {
    pub(crate) fn new(source: Arc<FeedSource>, session: u64) -> Self {
        Self { source, session }
    }

    #[must_use]
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Append text to the session source.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblerError::SessionClosed`] after [`finish`](Self::finish)
    /// or once the session has ended.
    pub fn push(&self, chunk: &str) -> Result<(), AssemblerError> {
        self.source.push(chunk)
    }

    /// Declare the source complete. The session completes once the paced
    /// buffer has caught up.
    pub fn finish(&self) {
        self.source.finish();
    }
}
