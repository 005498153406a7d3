//! The sending end of the framed protocol.
//!
//! A frame is a big endian length prefix followed by the serialized message.
//! Messages that carry an `f32` body hand it over as a borrowed tail, which is
//! written after the owned part without being copied into the frame buffer.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// The sending half of a connection.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    frame: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            frame: Vec::new(),
        }
    }

    /// Writes `msg` as a single frame and flushes it.
    ///
    /// # Arguments
    /// * `msg` - A serializable message, its `f32` body is not copied.
    ///
    /// # Errors
    /// Any io error of the underlying writer, a closed peer included.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { tx, frame } = self;

        frame.clear();
        frame.resize(LEN_TYPE_SIZE, 0);

        let tail = msg.serialize(frame);
        let tail_len = tail.map_or(0, <[u8]>::len);
        let len = (frame.len() - LEN_TYPE_SIZE + tail_len) as LenType;
        frame[..LEN_TYPE_SIZE].copy_from_slice(&len.to_be_bytes());

        tx.write_all(frame).await?;
        if let Some(tail) = tail.filter(|t| !t.is_empty()) {
            tx.write_all(tail).await?;
        }

        tx.flush().await
    }

    /// Flushes and closes the writing half, the peer then reads an end of stream.
    pub async fn close(&mut self) -> io::Result<()> {
        self.tx.shutdown().await
    }
}
