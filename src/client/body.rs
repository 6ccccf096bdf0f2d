//! The body of a successful response, filled in while it is read from the socket.
//!
//! Lines are kept in an append-only log. Every [`Body`] handle sees the whole log from
//! the first line, however late it was cloned, so readers replay from the start and then
//! follow new lines as they arrive.

use futures::stream::{self, Stream};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
struct Progress {
    lines: usize,
    finished: bool,
    failure: Option<String>,
}

/// A growing, append-only list of body lines.
#[derive(Clone)]
pub struct Body {
    lines: Arc<RwLock<Vec<String>>>,
    progress: watch::Receiver<Progress>,
}

/// The single writer of a [`Body`].
pub(crate) struct BodyWriter {
    lines: Arc<RwLock<Vec<String>>>,
    progress: watch::Sender<Progress>,
}

/// Create an empty body and the writer that fills it.
pub(crate) fn channel() -> (BodyWriter, Body) {
    let lines = Arc::new(RwLock::new(Vec::new()));
    let (sender, receiver) = watch::channel(Progress::default());

    (
        BodyWriter { lines: Arc::clone(&lines), progress: sender },
        Body { lines, progress: receiver },
    )
}

impl BodyWriter {
    /// Append a line and wake up readers.
    pub(crate) fn push(&self, line: String) {
        let count = {
            let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
            lines.push(line);
            lines.len()
        };

        self.progress.send_modify(|progress| progress.lines = count);
    }

    /// Mark the end of the data, recording why it stopped early if it did.
    pub(crate) fn finish(self, failure: Option<String>) {
        self.progress.send_modify(|progress| {
            progress.finished = true;
            progress.failure = failure;
        });
    }

    /// Resolves once every [`Body`] handle has been dropped.
    pub(crate) async fn closed(&self) {
        self.progress.closed().await;
    }
}

impl Body {
    fn line(&self, index: usize) -> Option<String> {
        self.lines.read().unwrap_or_else(PoisonError::into_inner).get(index).cloned()
    }

    /// The lines received so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The number of lines received so far.
    pub fn len(&self) -> usize {
        self.progress.borrow().lines
    }

    /// Whether no line has been received yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the connection has reached the end of the data. No more lines will be added.
    pub fn is_finished(&self) -> bool {
        self.progress.borrow().finished || self.progress.has_changed().is_err()
    }

    /// The read error that cut the body short, if any.
    pub fn failure(&self) -> Option<String> {
        self.progress.borrow().failure.clone()
    }

    /// Wait until the body grows or ends. Returns false once no further change can happen.
    pub async fn changed(&mut self) -> bool {
        if self.progress.borrow().finished {
            return false;
        }

        self.progress.changed().await.is_ok()
    }

    /// Wait for the end of the data and return every line.
    pub async fn complete(mut self) -> Vec<String> {
        while self.changed().await {}

        self.snapshot()
    }

    /// Every line of the body, starting from the first, as they become available.
    pub fn stream(&self) -> impl Stream<Item = String> + Send + 'static {
        stream::unfold((self.clone(), 0), |(mut body, next)| async move {
            loop {
                let finished = body.progress.borrow_and_update().finished;

                if let Some(line) = body.line(next) {
                    return Some((line, (body, next + 1)));
                }

                if finished || body.progress.changed().await.is_err() {
                    return body.line(next).map(|line| (line, (body, next + 1)));
                }
            }
        })
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("lines", &self.len())
            .field("finished", &self.is_finished())
            .finish()
    }
}
