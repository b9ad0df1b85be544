//! Progress-counting request body

use crate::progress::{ProgressReporter, TransferProgress};
use crate::s3::AbortSignal;
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

pin_project! {
    /// Chunked file stream that reports progress for every chunk it yields
    ///
    /// Holds at most one chunk in memory. After the abort signal fires it
    /// stops reporting and fails the stream with `Interrupted`. A source that
    /// yields more or fewer bytes than `total_bytes` fails the stream too.
    pub struct ProgressBody<R> {
        #[pin]
        inner: ReaderStream<R>,
        file_name: String,
        total_bytes: u64,
        bytes_sent: u64,
        reporter: Arc<dyn ProgressReporter>,
        abort: AbortSignal,
        done: bool,
    }
}

impl<R: AsyncRead> ProgressBody<R> {
    pub fn new(
        reader: R,
        chunk_size: usize,
        file_name: impl Into<String>,
        total_bytes: u64,
        reporter: Arc<dyn ProgressReporter>,
        abort: AbortSignal,
    ) -> Self {
        Self {
            inner: ReaderStream::with_capacity(reader, chunk_size.max(1)),
            file_name: file_name.into(),
            total_bytes,
            bytes_sent: 0,
            reporter,
            abort,
            done: false,
        }
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "upload aborted")
}

impl<R: AsyncRead> Stream for ProgressBody<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        if this.abort.is_aborted() {
            *this.done = true;
            return Poll::Ready(Some(Err(aborted())));
        }

        let next = ready!(this.inner.poll_next(cx));

        // The abort may have fired while the read was pending.
        if this.abort.is_aborted() {
            *this.done = true;
            return Poll::Ready(Some(Err(aborted())));
        }

        match next {
            Some(Ok(chunk)) => {
                *this.bytes_sent += chunk.len() as u64;
                if *this.bytes_sent > *this.total_bytes {
                    *this.done = true;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "{} grew past its declared size of {} bytes",
                            this.file_name, this.total_bytes
                        ),
                    ))));
                }

                this.reporter.on_progress(
                    this.file_name.as_str(),
                    TransferProgress::new(*this.bytes_sent, *this.total_bytes),
                );
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                *this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                *this.done = true;
                if *this.bytes_sent < *this.total_bytes {
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "{} ended after {} of {} bytes",
                            this.file_name, this.bytes_sent, this.total_bytes
                        ),
                    ))));
                }
                if *this.total_bytes == 0 {
                    this.reporter
                        .on_progress(this.file_name.as_str(), TransferProgress::new(0, 0));
                }
                Poll::Ready(None)
            }
        }
    }
}
