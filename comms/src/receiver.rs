use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    Align4, Deserialize, LEN_TYPE_SIZE, LenType,
    msg::Msg,
    protocol::{self, FIELD, HEADER_SIZE, HeaderType},
};

/// The receiving end handle of the communication.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    /// Creates a new `OnoReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Waits to receive a new message from the inner receiver.
    ///
    /// # Arguments
    /// * `buf` - The buffer to use for deserialization, the returned
    ///   `T`'s lifetimes will be tied to this buffer.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure.
    pub async fn recv_into<'buf, T, B>(&mut self, buf: &'buf mut Vec<B>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
        B: Align4,
    {
        let len = self.read_len().await?;
        let slice = Self::prepare(buf, len);
        self.rx.read_exact(slice).await?;

        T::deserialize(slice)
    }

    /// Receives one batch field and writes its values straight into `dst`.
    ///
    /// The incoming frame must be a `Field` payload of exactly `dst.len()` values,
    /// anything else is reported as an `InvalidData` error. If the peer sent an
    /// `Err` message instead, its text is carried by the returned error.
    ///
    /// # Arguments
    /// * `dst` - The landing zone for the field's values.
    ///
    /// # Returns
    /// An io error if the read failed or the frame didn't match.
    pub async fn recv_field_into(&mut self, dst: &mut [f32]) -> io::Result<()> {
        let len = self.read_len().await?;
        if len < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("received a frame of {len} bytes, shorter than its header"),
            ));
        }

        let mut header = [0; HEADER_SIZE];
        self.rx.read_exact(&mut header).await?;
        let kind = HeaderType::from_be_bytes(header);
        let body_len = len - HEADER_SIZE;

        if kind == FIELD && body_len == size_of_val(dst) {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
            self.rx.read_exact(bytes).await?;
            return Ok(());
        }

        // Drain the unexpected frame so the diagnostic can tell what it was.
        let mut scratch: Vec<u32> = Vec::new();
        let slice = Self::prepare(&mut scratch, len);
        slice[..HEADER_SIZE].copy_from_slice(&header);
        self.rx.read_exact(&mut slice[HEADER_SIZE..]).await?;

        let detail = match Msg::deserialize(slice)? {
            Msg::Err(text) => return Err(io::Error::other(format!("peer reported: {text}"))),
            Msg::Data(_) if kind == FIELD => format!(
                "field size mismatch, got {body_len} bytes, expected {}",
                size_of_val(dst)
            ),
            msg => format!("expected {}, got {}", protocol::kind_name(FIELD), msg.kind()),
        };

        Err(io::Error::new(io::ErrorKind::InvalidData, detail))
    }

    async fn read_len(&mut self) -> io::Result<usize> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        Ok(LenType::from_be_bytes(size_buf) as usize)
    }

    /// Grows `buf` to hold `len` bytes and returns a byte view of exactly that size.
    fn prepare<B: Align4>(buf: &mut Vec<B>, len: usize) -> &mut [u8] {
        let needed_amount = len.div_ceil(size_of::<B>());
        buf.resize(needed_amount, B::zeroed());

        let view = bytemuck::cast_slice_mut(buf);
        &mut view[..len]
    }
}
