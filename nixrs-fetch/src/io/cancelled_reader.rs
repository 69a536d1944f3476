use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Cancelled;

/// Handle that aborts the reads of the paired [`CancelledReader`].
///
/// Dropping the token without calling [`cancel`](Self::cancel) leaves the
/// reader running.
#[derive(Debug)]
pub struct CancelToken(oneshot::Sender<()>);

impl CancelToken {
    pub fn cancel(self) {
        self.0.send(()).ok();
    }
}

pin_project! {
    /// Reader whose pending and future reads fail with [`Cancelled`] once
    /// its [`CancelToken`] fires.
    #[derive(Debug)]
    pub struct CancelledReader<R> {
        #[pin]
        reader: R,
        cancel: Option<oneshot::Receiver<()>>,
        cancelled: bool,
    }
}

impl<R> CancelledReader<R> {
    pub fn new(reader: R) -> (CancelledReader<R>, CancelToken) {
        let (tx, rx) = oneshot::channel();
        let reader = CancelledReader {
            reader,
            cancel: Some(rx),
            cancelled: false,
        };
        (reader, CancelToken(tx))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncRead> AsyncRead for CancelledReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if let Some(rx) = this.cancel.as_mut() {
            match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(())) => {
                    debug!("source cancelled");
                    *this.cancelled = true;
                    *this.cancel = None;
                }
                Poll::Ready(Err(_)) => *this.cancel = None,
                Poll::Pending => {}
            }
        }
        if *this.cancelled {
            return Poll::Ready(Err(Cancelled.into_io_error()));
        }
        this.reader.poll_read(cx, buf)
    }
}
