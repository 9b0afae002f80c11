//! Blob response bodies that report how the transfer ended.

use crate::storage::BlobStream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// How a blob transfer finished.
#[derive(Debug)]
pub enum TransferOutcome {
    Completed { bytes: u64 },
    NotFound,
    Failed(io::Error),
    /// The body was dropped before the source ended, e.g. the client went away.
    Aborted { bytes: u64 },
}

/// Wraps a [`BlobStream`] and reports its first terminal event, exactly once,
/// on a oneshot channel. Whatever ends the transfer first (end of data, an
/// error, or the body being dropped) decides the outcome; the stream yields
/// nothing after that.
pub struct TrackedBody {
    inner: BlobStream,
    bytes: u64,
    done: Option<oneshot::Sender<TransferOutcome>>,
}

impl TrackedBody {
    pub fn new(inner: BlobStream) -> (Self, oneshot::Receiver<TransferOutcome>) {
        let (tx, rx) = oneshot::channel();
        let body = Self {
            inner,
            bytes: 0,
            done: Some(tx),
        };
        (body, rx)
    }

    fn finish(&mut self, outcome: TransferOutcome) {
        if let Some(tx) = self.done.take() {
            // The receiver may already be gone; nobody is left to tell.
            let _ = tx.send(outcome);
        }
    }
}

impl Stream for TrackedBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done.is_none() {
            return Poll::Ready(None);
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                let reported = io::Error::new(err.kind(), err.to_string());
                let outcome = if err.kind() == io::ErrorKind::NotFound {
                    TransferOutcome::NotFound
                } else {
                    TransferOutcome::Failed(err)
                };
                self.finish(outcome);
                Poll::Ready(Some(Err(reported)))
            }
            Poll::Ready(None) => {
                let bytes = self.bytes;
                self.finish(TransferOutcome::Completed { bytes });
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        let bytes = self.bytes;
        self.finish(TransferOutcome::Aborted { bytes });
    }
}
