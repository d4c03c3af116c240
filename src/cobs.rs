//! Consistent Overhead Byte Stuffing.
//!
//! Packets are zero-delimited on the wire: a single leading overhead byte
//! followed by up to 254 data bytes and a trailing `0x00` delimiter, with
//! no zero bytes anywhere else in the packet. Encoded packet size is in
//! `[2, 255]` including the delimiter.

use crate::error::{OniError, OniResult};

/// Maximum number of data bytes a single COBS packet can carry.
pub const MAX_DATA_LEN: usize = 254;

/// Encode `src` as a COBS packet, including the trailing zero delimiter.
///
/// Fails with [`OniError::BadCOBSPacket`] if `src` is longer than
/// [`MAX_DATA_LEN`] bytes.
pub fn encode(src: &[u8]) -> OniResult<Vec<u8>> {
    if src.len() > MAX_DATA_LEN {
        return Err(OniError::BadCOBSPacket);
    }

    let mut out = Vec::with_capacity(src.len() + 2);
    let mut code_idx = 0usize;
    let mut code = 1u8;
    out.push(0); // placeholder for the first code byte

    for &byte in src {
        if byte == 0 {
            out[code_idx] = code;
            code_idx = out.len();
            out.push(0); // placeholder for the next code byte
            code = 1;
        } else {
            out.push(byte);
            code += 1;
            if code == 0xFF {
                out[code_idx] = code;
                code_idx = out.len();
                out.push(0);
                code = 1;
            }
        }
    }

    out[code_idx] = code;
    out.push(0); // delimiter
    Ok(out)
}

/// Decode a COBS packet (including its trailing zero delimiter) back into
/// the original data bytes.
///
/// `src` must be `[2, 255]` bytes long. Fails with
/// [`OniError::BadCOBSPacket`] if a zero-run implied by a code byte would
/// run past the end of the packet.
pub fn decode(src: &[u8]) -> OniResult<Vec<u8>> {
    if src.len() < 2 || src.len() > 255 {
        return Err(OniError::BadCOBSPacket);
    }

    // The delimiter itself is not part of the stuffed data.
    let body = &src[..src.len() - 1];
    let mut out = Vec::with_capacity(body.len());

    let mut i = 0usize;
    while i < body.len() {
        let code = body[i] as usize;
        if code == 0 {
            return Err(OniError::BadCOBSPacket);
        }
        i += 1;

        let run_end = i + (code - 1);
        if run_end > body.len() {
            return Err(OniError::BadCOBSPacket);
        }
        out.extend_from_slice(&body[i..run_end]);
        i = run_end;

        if code < 0xFF && i < body.len() {
            out.push(0);
        }
    }

    Ok(out)
}
