use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug)]
struct LogInner {
    lines: Vec<String>,
    closed: bool,
    wakers: Vec<Waker>,
}

/// Captured output of one supervised process.
///
/// A single producer appends completed lines; any number of readers opened
/// later replay the same lines from the beginning. The buffer stays open
/// while the process can still emit output, so readers can distinguish
/// "nothing yet" from true end-of-stream.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    inner: Arc<Mutex<LogInner>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        LogBuffer {
            inner: Arc::new(Mutex::new(LogInner {
                lines: Vec::new(),
                closed: false,
                wakers: Vec::new(),
            })),
        }
    }

    pub fn append_line(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.lines.push(line.to_string());
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    /// Marks the producer side as finished. Readers that have drained every
    /// captured line will observe end-of-stream from now on.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Opens a reader positioned at the first captured line.
    pub fn reader(&self) -> LogReader {
        LogReader {
            inner: Arc::clone(&self.inner),
            line: 0,
            offset: 0,
        }
    }

    /// Snapshot of every line captured so far, in emission order.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().unwrap().lines.clone()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte-stream view over a [`LogBuffer`]: each captured line followed by a
/// line feed. Reads on an open, fully drained buffer are pending, not EOF.
pub struct LogReader {
    inner: Arc<Mutex<LogInner>>,
    line: usize,
    offset: usize,
}

impl AsyncRead for LogReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let mut inner = me.inner.lock().unwrap();

        let mut wrote = false;
        while buf.remaining() > 0 {
            let Some(line) = inner.lines.get(me.line) else {
                break;
            };
            let bytes = line.as_bytes();
            if me.offset < bytes.len() {
                let n = buf.remaining().min(bytes.len() - me.offset);
                buf.put_slice(&bytes[me.offset..me.offset + n]);
                me.offset += n;
            } else {
                buf.put_slice(b"\n");
                me.line += 1;
                me.offset = 0;
            }
            wrote = true;
        }

        if wrote || inner.closed {
            return Poll::Ready(Ok(()));
        }
        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
