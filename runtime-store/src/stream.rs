//! The `Stream` a `Watch`/`WatchKind` subscription hands back to callers.

use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures::Stream;
use runtime_core::{Error, Result};
use tokio::sync::mpsc;

use crate::event::Event;

/// An ordered stream of [`Event`]s from a single `Watch` or `WatchKind`
/// subscription.
///
/// Ends with `Some(Err(Error::BufferOverrun(..)))` if the consumer fell
/// further behind than the store's configured gap threshold;
/// otherwise simply ends (`None`) when the store drops the subscription or
/// the stream is no longer polled after a cancellation.
pub struct WatchStream {
    rx: mpsc::Receiver<Event>,
    overrun: Arc<AtomicBool>,
    subject: String,
    finished: bool,
}

impl WatchStream {
    pub(crate) fn new(rx: mpsc::Receiver<Event>, overrun: Arc<AtomicBool>, subject: String) -> Self {
        Self {
            rx,
            overrun,
            subject,
            finished: false,
        }
    }
}

impl Stream for WatchStream {
    type Item = Result<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(None) => {
                self.finished = true;
                if self.overrun.load(Ordering::SeqCst) {
                    Poll::Ready(Some(Err(Error::BufferOverrun(self.subject.clone()))))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
