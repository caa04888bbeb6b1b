//! Cancellable streaming pagination.
//!
//! A producer task fetches pages on demand and hands records to the consumer
//! one at a time over a single-slot channel. A separate completion signal
//! carries the final outcome exactly once. The producer checks the
//! cancellation token before every page request and every handoff; after it
//! observes cancellation it neither fetches nor sends anything else.

use crate::error::ReplicaError;
use crate::services::remote::check_page_size;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Consumer side of a streaming fetch.
///
/// Yields records in server page order. Call [`PageStream::finish`] after the
/// stream ends to learn whether it ended because of success, an error or
/// cancellation.
pub struct PageStream<T> {
    items: mpsc::Receiver<T>,
    done: Option<oneshot::Receiver<Result<(), ReplicaError>>>,
    cancel: CancellationToken,
    /// Set when cancellation ended the stream before every record was seen.
    cut_short: bool,
}

/// Spawn a producer that walks pages `1..` through `fetch_page` until a page
/// shorter than `per_page` comes back.
///
/// Must be called from within a tokio runtime.
pub fn spawn_page_stream<T, F, Fut>(
    per_page: u32,
    cancel: CancellationToken,
    fetch_page: F,
) -> PageStream<T>
where
    T: Send + 'static,
    F: FnMut(u32) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>, ReplicaError>> + Send,
{
    let (item_tx, item_rx) = mpsc::channel(1);
    let (done_tx, done_rx) = oneshot::channel();
    let producer_cancel = cancel.clone();

    tokio::spawn(async move {
        let result = produce(per_page, &producer_cancel, fetch_page, &item_tx).await;
        // Close the data side before reporting completion.
        drop(item_tx);
        if let Err(e) = &result {
            log::debug!("[stream] Producer finished with error: {}", e);
        }
        let _ = done_tx.send(result);
    });

    PageStream {
        items: item_rx,
        done: Some(done_rx),
        cancel,
        cut_short: false,
    }
}

async fn produce<T, F, Fut>(
    per_page: u32,
    cancel: &CancellationToken,
    mut fetch_page: F,
    tx: &mpsc::Sender<T>,
) -> Result<(), ReplicaError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ReplicaError>>,
{
    check_page_size(per_page)?;
    let mut page = 1u32;

    loop {
        let items = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReplicaError::cancelled()),
            fetched = fetch_page(page) => fetched?,
        };
        let count = items.len();

        for item in items {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReplicaError::cancelled()),
                sent = tx.send(item) => {
                    if sent.is_err() {
                        // Consumer went away; nobody is left to hand records to.
                        return Err(ReplicaError::cancelled());
                    }
                }
            }
        }

        if count < per_page as usize {
            return Ok(());
        }
        page += 1;
    }
}

impl<T> PageStream<T> {
    /// Token observed by the producer. Cancelling it stops the stream.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop the stream. No further records are yielded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receive the next record, or `None` once the stream ended or was cancelled.
    pub async fn next_item(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return self.stop_on_cancel();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => self.stop_on_cancel(),
            item = self.items.recv() => item,
        }
    }

    /// Stop yielding after cancellation. The stream only counts as complete
    /// when the producer had already closed the channel and nothing was left
    /// in it.
    fn stop_on_cancel(&mut self) -> Option<T> {
        if !matches!(self.items.try_recv(), Err(TryRecvError::Disconnected)) {
            self.cut_short = true;
        }
        None
    }

    /// Wait for the producer's outcome.
    ///
    /// Returns `Ok(())` when every record was delivered, the fetch error when
    /// a page failed, and `Cancelled` when the stream was cancelled or records
    /// were left undelivered.
    pub async fn finish(mut self) -> Result<(), ReplicaError> {
        // Unblock a producer parked on a full slot.
        self.items.close();
        if self.cut_short || self.items.try_recv().is_ok() {
            log::debug!("[stream] Stream ended before all records were delivered");
            return Err(ReplicaError::cancelled());
        }
        let done = match self.done.take() {
            Some(done) => done,
            None => return Err(ReplicaError::internal("stream already finished")),
        };
        match done.await {
            Ok(result) => result,
            Err(_) => Err(ReplicaError::internal("stream producer exited without completing")),
        }
    }

    /// Drain every record, then report the outcome. Records received before a
    /// failure are discarded.
    pub async fn collect_all(mut self) -> Result<Vec<T>, ReplicaError> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await {
            items.push(item);
        }
        self.finish().await?;
        Ok(items)
    }
}

impl<T> Stream for PageStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(self.stop_on_cancel());
        }
        self.items.poll_recv(cx)
    }
}

impl<T> Drop for PageStream<T> {
    fn drop(&mut self) {
        // A stream dropped mid-way must not leave its producer fetching pages.
        if self.done.is_some() {
            self.cancel.cancel();
        }
    }
}
