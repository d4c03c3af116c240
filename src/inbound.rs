//! Inbound frame assembler.
//!
//! Reads raw bytes from the transport's Data stream into a shared
//! refill buffer, then hands out [`Frame`] handles that reference
//! windows of that buffer without copying. A frame keeps its buffer
//! alive (via `Bytes`'s atomic refcount) until the caller drops it, even
//! across later refills.

use bytes::{Buf, Bytes, BytesMut};

use crate::driver::{OniDriver, ReadStream};
use crate::error::{OniError, OniResult};

const HEADER_SIZE: usize = 16; // u64 timestamp + u32 dev_idx + u32 data_sz
const TRANSPORT_WORD_SIZE: usize = 4;

fn round_up_word(n: usize) -> usize {
    (n + TRANSPORT_WORD_SIZE - 1) / TRANSPORT_WORD_SIZE * TRANSPORT_WORD_SIZE
}

/// One inbound frame: a timestamped, device-tagged window into a
/// shared refill buffer. Dropping a frame releases its reference to
/// that buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: u64,
    pub dev_idx: u32,
    pub data_sz: u32,
    payload: Bytes,
}

impl Frame {
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.data_sz as usize]
    }
}

/// Owns the current refill buffer and its read cursor; refills at most
/// once per [`InboundAssembler::read_frame`] call so the header pointer
/// obtained mid-call is never invalidated by a second refill.
pub struct InboundAssembler {
    buf: BytesMut,
    max_read_frame_size: usize,
    block_read_size: usize,
}

impl InboundAssembler {
    pub fn new(max_read_frame_size: usize, block_read_size: usize) -> Self {
        InboundAssembler {
            buf: BytesMut::new(),
            max_read_frame_size,
            block_read_size,
        }
    }

    pub fn set_sizes(&mut self, max_read_frame_size: usize, block_read_size: usize) {
        self.max_read_frame_size = max_read_frame_size;
        self.block_read_size = block_read_size;
    }

    /// Mark the current buffer exhausted so the next `read_frame` call
    /// refills from a fresh boundary. Advisory, not an eager free:
    /// outstanding frame references keep the backing storage alive
    /// regardless.
    pub fn drop_current_buffer(&mut self) {
        self.buf = BytesMut::new();
    }

    /// Refill if fewer than `max_read_frame_size` bytes remain unread.
    /// Copies the unread tail into a fresh buffer of
    /// `remaining + block_read_size` bytes, then reads exactly
    /// `block_read_size` fresh bytes from the transport immediately
    /// after the copied tail.
    fn ensure_frame_headroom(&mut self, driver: &dyn OniDriver) -> OniResult<()> {
        if self.buf.len() >= self.max_read_frame_size {
            return Ok(());
        }

        let remaining = self.buf.len();
        let mut fresh = BytesMut::with_capacity(remaining + self.block_read_size);
        fresh.extend_from_slice(&self.buf);
        self.buf = fresh;

        let start = self.buf.len();
        self.buf.resize(start + self.block_read_size, 0);
        // One read call, no retry loop: a short read on the Data stream
        // is a hard failure here, unlike the outbound side's partial-write
        // loop. The transport is expected to deliver `block_read_size`
        // bytes in a single call or not at all.
        let n = driver.read_stream(ReadStream::Data, &mut self.buf[start..start + self.block_read_size])?;
        if n != self.block_read_size {
            return Err(OniError::ReadFailure);
        }
        Ok(())
    }

    /// Parse one frame header and payload window from the current
    /// buffer, without refilling.
    fn take_window(&mut self) -> OniResult<Frame> {
        if self.buf.len() < HEADER_SIZE {
            return Err(OniError::ReadFailure);
        }

        let timestamp = u64::from_le_bytes(self.buf[0..8].try_into().unwrap());
        let dev_idx = u32::from_le_bytes(self.buf[8..12].try_into().unwrap());
        let data_sz = u32::from_le_bytes(self.buf[12..16].try_into().unwrap());
        self.buf.advance(HEADER_SIZE);

        if data_sz == 0 || data_sz as usize > self.max_read_frame_size {
            return Err(OniError::BadFrame);
        }

        let rounded = round_up_word(data_sz as usize);
        if self.buf.len() < rounded {
            return Err(OniError::ReadFailure);
        }

        let window = self.buf.split_to(rounded).freeze();

        Ok(Frame {
            timestamp,
            dev_idx,
            data_sz,
            payload: window,
        })
    }

    /// Read one frame, refilling the underlying buffer at most once.
    pub fn read_frame(&mut self, driver: &dyn OniDriver) -> OniResult<Frame> {
        self.ensure_frame_headroom(driver)?;
        self.take_window()
    }
}
