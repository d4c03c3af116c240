//! Outbound frame builder.
//!
//! Allocates write-frame headers and payloads into a rolling write
//! buffer and issues contiguous writes to the transport. Mirrors
//! [`crate::inbound::InboundAssembler`]'s buffer-reuse strategy but for
//! the write-side arena: a frame's header+payload region is carved out
//! of the current buffer, and a fresh buffer is allocated only when the
//! current one lacks room.

use bytes::{Bytes, BytesMut};

use crate::device::DeviceDescriptor;
use crate::driver::{OniDriver, WriteStream};
use crate::error::{OniError, OniResult};

const HEADER_SIZE: usize = 8; // 2 x u32: dev_idx, data_sz_in_words
const TRANSPORT_WORD_SIZE: usize = 4;

fn round_up_word(n: usize) -> usize {
    (n + TRANSPORT_WORD_SIZE - 1) / TRANSPORT_WORD_SIZE * TRANSPORT_WORD_SIZE
}

/// One outbound frame: a device-tagged payload window inside a shared
/// write buffer, ready to be sent with [`OutboundBuilder::write_frame`].
#[derive(Debug, Clone)]
pub struct WriteFrame {
    dev_idx: u32,
    data_sz: u32,
    region: Bytes, // header + padded payload, contiguous
}

/// Owns the current write buffer and its cursor.
pub struct OutboundBuilder {
    buf: BytesMut,
    block_write_size: usize,
}

impl OutboundBuilder {
    pub fn new(block_write_size: usize) -> Self {
        OutboundBuilder {
            buf: BytesMut::new(),
            block_write_size,
        }
    }

    pub fn set_block_write_size(&mut self, block_write_size: usize) {
        self.block_write_size = block_write_size;
    }

    pub fn drop_current_buffer(&mut self) {
        self.buf = BytesMut::new();
    }

    /// Build a write frame for `device`, copying `data` into the write
    /// buffer. `data.len()` must be a positive multiple of the device's
    /// `write_size`.
    pub fn create_frame(&mut self, device: &DeviceDescriptor, data: &[u8]) -> OniResult<WriteFrame> {
        if !device.is_writable() {
            return Err(OniError::NotWritable);
        }
        if data.is_empty() || data.len() % device.write_size as usize != 0 {
            return Err(OniError::BadWriteSize);
        }

        let rounded = round_up_word(data.len());
        let needed = HEADER_SIZE + rounded;

        if self.buf.capacity() - self.buf.len() < needed {
            if needed > self.block_write_size {
                return Err(OniError::BadAlloc);
            }
            self.buf = BytesMut::with_capacity(self.block_write_size);
        }

        let start = self.buf.len();
        self.buf.resize(start + needed, 0);
        self.buf[start..start + 4].copy_from_slice(&device.idx.to_le_bytes());
        let words = (rounded / TRANSPORT_WORD_SIZE) as u32;
        self.buf[start + 4..start + 8].copy_from_slice(&words.to_le_bytes());
        self.buf[start + HEADER_SIZE..start + HEADER_SIZE + data.len()].copy_from_slice(data);

        let region = self.buf.split_to(start + needed).freeze().slice(start..);

        Ok(WriteFrame {
            dev_idx: device.idx,
            data_sz: data.len() as u32,
            region,
        })
    }

    /// Send `frame`'s header and payload as one logical transport
    /// write, looping on partial writes until the whole region is sent.
    pub fn write_frame(&self, driver: &dyn OniDriver, frame: &WriteFrame) -> OniResult<usize> {
        let total = frame.region.len();
        let mut sent = 0usize;
        while sent < total {
            let n = driver.write_stream(WriteStream::Data, &frame.region[sent..])?;
            if n == 0 {
                return Err(OniError::WriteFailure);
            }
            sent += n;
        }
        Ok(total)
    }
}

impl WriteFrame {
    pub fn dev_idx(&self) -> u32 {
        self.dev_idx
    }

    pub fn data_sz(&self) -> u32 {
        self.data_sz
    }
}
