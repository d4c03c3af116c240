//! Signal channel parser.
//!
//! The signal stream carries COBS-delimited packets. Each packet's
//! unstuffed payload begins with a little-endian `u32` signal-type
//! bitmask, followed by a type-specific payload. Malformed or
//! unexpected-type packets are discarded and the pump retries; only a
//! hard transport error aborts the loop.

use crate::cobs;
use crate::driver::{OniDriver, ReadStream};
use crate::error::{OniError, OniResult};

pub const NULL_SIG: u32 = 1 << 0;
pub const CONFIG_WRITE_ACK: u32 = 1 << 1;
pub const CONFIG_WRITE_NACK: u32 = 1 << 2;
pub const CONFIG_READ_ACK: u32 = 1 << 3;
pub const CONFIG_READ_NACK: u32 = 1 << 4;
pub const DEVICE_TABLE_ACK: u32 = 1 << 5;
pub const DEVICE_INSTANCE: u32 = 1 << 6;

/// Read one COBS-delimited packet from the signal stream, one byte at a
/// time, stopping at (and including) the zero delimiter.
fn read_packet(driver: &dyn OniDriver) -> OniResult<Vec<u8>> {
    let mut packet = Vec::with_capacity(16);
    let mut byte = [0u8; 1];
    loop {
        if packet.len() > 255 {
            return Err(OniError::BadCOBSPacket);
        }
        if driver.read_stream(ReadStream::Signal, &mut byte)? == 0 {
            return Err(OniError::ReadFailure);
        }
        packet.push(byte[0]);
        if byte[0] == 0 {
            return Ok(packet);
        }
    }
}

/// A decoded signal: its type bitmask and the payload following it.
struct Signal {
    signal_type: u32,
    payload: Vec<u8>,
}

fn read_signal(driver: &dyn OniDriver) -> OniResult<Option<Signal>> {
    let packet = read_packet(driver)?;
    let unstuffed = match cobs::decode(&packet) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(None),
    };
    if unstuffed.len() < 4 {
        return Ok(None);
    }
    let signal_type = u32::from_le_bytes(unstuffed[..4].try_into().unwrap());
    let payload = unstuffed[4..].to_vec();
    Ok(Some(Signal {
        signal_type,
        payload,
    }))
}

/// Pump the signal channel, discarding packets until one matches
/// `expected_mask`, and return the exact bit that matched along with
/// that packet's payload. Returning the matched bit (rather than just
/// the payload) lets callers distinguish e.g. `ConfigWriteAck` from
/// `ConfigWriteNack` when both are in the same `expected_mask`.
pub fn pump_until_type_with_payload(
    driver: &dyn OniDriver,
    expected_mask: u32,
) -> OniResult<(u32, Vec<u8>)> {
    loop {
        if let Some(signal) = read_signal(driver)? {
            let matched = signal.signal_type & expected_mask;
            if matched != 0 {
                return Ok((matched, signal.payload));
            }
        }
    }
}

/// Pump the signal channel until a packet matching `expected_mask`
/// arrives, discarding its payload, and return the exact bit matched.
pub fn pump_until_type(driver: &dyn OniDriver, expected_mask: u32) -> OniResult<u32> {
    pump_until_type_with_payload(driver, expected_mask).map(|(matched, _)| matched)
}
