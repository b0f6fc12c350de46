use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

/// Readable view over the captured output of a node (or of every member of
/// a composite, concatenated in member order).
pub type NodeOutput = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Uniform lifecycle contract shared by a single supervised instance and by
/// the composite topologies built on top of it.
#[async_trait]
pub trait Node: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Starts the node and blocks until it is ready or has failed.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Stops the node, blocking until termination is observed.
    async fn stop(&self) -> Result<(), Self::Error>;

    async fn is_active(&self) -> bool;

    /// Ports the node is bound to (or will bind to once started).
    fn ports(&self) -> Vec<u16>;

    /// Captured process output.
    fn output(&self) -> NodeOutput;
}

/// Reads a sequence of sources back to back: once one source reports
/// end-of-stream the next takes over.
pub struct SequenceReader {
    sources: VecDeque<NodeOutput>,
}

impl SequenceReader {
    pub fn new(sources: Vec<NodeOutput>) -> Self {
        SequenceReader {
            sources: sources.into(),
        }
    }
}

impl AsyncRead for SequenceReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            let Some(source) = me.sources.front_mut() else {
                return Poll::Ready(Ok(()));
            };
            let before = buf.filled().len();
            match Pin::new(source).poll_read(cx, buf) {
                Poll::Ready(Ok(())) => {
                    if buf.filled().len() == before {
                        me.sources.pop_front();
                        continue;
                    }
                    return Poll::Ready(Ok(()));
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogBuffer;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn concatenates_sources_in_order() {
        let first = LogBuffer::new();
        first.append_line("alpha");
        first.close();
        let second = LogBuffer::new();
        second.append_line("beta");
        second.close();

        let mut chained = SequenceReader::new(vec![
            Box::new(first.reader()),
            Box::new(second.reader()),
        ]);

        let mut out = String::new();
        chained.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn empty_source_list_is_end_of_stream() {
        let mut chained = SequenceReader::new(Vec::new());
        let mut out = Vec::new();
        chained.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
