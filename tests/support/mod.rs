//! In-process emulator driver.
//!
//! Implements [`OniDriver`] entirely in memory so integration tests can
//! drive a full [`oni_core::OniContext`] deterministically: discovery
//! always yields the same four-device table, Data-stream reads produce
//! a synthetic, monotonically timestamped frame sequence, and register
//! transactions are serviced synchronously at the moment `Trig` is
//! written. This is test support, not a production transport driver —
//! it never ships behind anything but `#[cfg(test)]`/this `tests/` tree.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use oni_core::cobs;
use oni_core::driver::{DriverInfo, OniDriver, ReadStream, WriteStream};
use oni_core::error::{OniError, OniResult};
use oni_core::registers;

const SIG_NULL: u32 = 1 << 0;
const SIG_CONFIG_WRITE_ACK: u32 = 1 << 1;
const SIG_CONFIG_WRITE_NACK: u32 = 1 << 2;
const SIG_CONFIG_READ_ACK: u32 = 1 << 3;
const SIG_CONFIG_READ_NACK: u32 = 1 << 4;
const SIG_DEVICE_TABLE_ACK: u32 = 1 << 5;
const SIG_DEVICE_INSTANCE: u32 = 1 << 6;

struct EmulatedDevice {
    idx: u32,
    id: u32,
    version: u32,
    read_size: u32,
    write_size: u32,
}

const DEVICES: &[(u32, u32, u32)] = &[
    // (idx, read_size, write_size)
    (0x000, 32, 4),
    (0x100, 32, 0),
    (0x200, 32, 0),
    (0x300, 32, 0),
];

fn devices() -> Vec<EmulatedDevice> {
    DEVICES
        .iter()
        .map(|&(idx, read_size, write_size)| EmulatedDevice {
            idx,
            id: 10,
            version: 1,
            read_size,
            write_size,
        })
        .collect()
}

fn signal_packet(signal_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = signal_type.to_le_bytes().to_vec();
    body.extend_from_slice(payload);
    cobs::encode(&body).expect("signal payload within COBS capacity")
}

fn device_wire(device: &EmulatedDevice) -> Vec<u8> {
    let mut out = Vec::with_capacity(20);
    out.extend_from_slice(&device.idx.to_le_bytes());
    out.extend_from_slice(&device.id.to_le_bytes());
    out.extend_from_slice(&device.version.to_le_bytes());
    out.extend_from_slice(&device.read_size.to_le_bytes());
    out.extend_from_slice(&device.write_size.to_le_bytes());
    out
}

struct DataGenerator {
    next_timestamp: u64,
    next_device: usize,
    pending: VecDeque<u8>,
}

impl DataGenerator {
    fn new() -> Self {
        DataGenerator {
            next_timestamp: 1,
            next_device: 0,
            pending: VecDeque::new(),
        }
    }

    fn push_frame(&mut self) {
        let devices = devices();
        let device = &devices[self.next_device % devices.len()];
        self.next_device += 1;

        let payload = vec![0xABu8; device.read_size as usize];
        let mut frame = Vec::with_capacity(16 + payload.len());
        frame.extend_from_slice(&self.next_timestamp.to_le_bytes());
        frame.extend_from_slice(&device.idx.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        self.next_timestamp += 1;

        self.pending.extend(frame);
    }

    fn fill(&mut self, buf: &mut [u8]) {
        while self.pending.len() < buf.len() {
            self.push_frame();
        }
        for slot in buf.iter_mut() {
            *slot = self.pending.pop_front().unwrap();
        }
    }
}

struct ConfigState {
    values: HashMap<u32, u32>,
    device_registers: HashMap<(u32, u32), u32>,
}

impl ConfigState {
    fn new() -> Self {
        ConfigState {
            values: HashMap::new(),
            device_registers: HashMap::new(),
        }
    }

    fn get(&self, reg: u32) -> u32 {
        *self.values.get(&reg).unwrap_or(&0)
    }

    fn set(&mut self, reg: u32, value: u32) {
        self.values.insert(reg, value);
    }
}

/// Test-only in-process emulator driver.
pub struct EmulatorDriver {
    config: Mutex<ConfigState>,
    signal_queue: Mutex<VecDeque<u8>>,
    data: Mutex<DataGenerator>,
}

impl EmulatorDriver {
    pub fn new() -> Self {
        let mut signal_queue = VecDeque::new();
        signal_queue.extend(signal_packet(
            SIG_DEVICE_TABLE_ACK,
            &(DEVICES.len() as u32).to_le_bytes(),
        ));
        for device in devices() {
            signal_queue.extend(signal_packet(SIG_DEVICE_INSTANCE, &device_wire(&device)));
        }

        EmulatorDriver {
            config: Mutex::new(ConfigState::new()),
            signal_queue: Mutex::new(signal_queue),
            data: Mutex::new(DataGenerator::new()),
        }
    }

    /// Process a latched register transaction at the moment `Trig` is
    /// written, mirroring real hardware committing synchronously to the
    /// wire the core would otherwise have to poll for.
    fn commit_transaction(&self, config: &mut ConfigState) {
        let dev_idx = config.get(registers::DEV_IDX);
        let reg_addr = config.get(registers::REG_ADDR);
        let rw = config.get(registers::RW);

        // Register address 99 is never valid on this emulator; exercises
        // the NACK path in register-transaction tests.
        let valid = reg_addr != 99;

        let mut queue = self.signal_queue.lock().unwrap();
        if rw == 1 {
            let value = config.get(registers::REG_VALUE);
            if valid {
                config.device_registers.insert((dev_idx, reg_addr), value);
                queue.extend(signal_packet(SIG_CONFIG_WRITE_ACK, &[]));
            } else {
                queue.extend(signal_packet(SIG_CONFIG_WRITE_NACK, &[]));
            }
        } else if valid {
            let value = *config.device_registers.get(&(dev_idx, reg_addr)).unwrap_or(&0);
            config.set(registers::REG_VALUE, value);
            queue.extend(signal_packet(SIG_CONFIG_READ_ACK, &[]));
        } else {
            queue.extend(signal_packet(SIG_CONFIG_READ_NACK, &[]));
        }

        config.set(registers::TRIG, 0);
    }
}

impl Default for EmulatorDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OniDriver for EmulatorDriver {
    fn init(&self, _host_idx: i32) -> OniResult<()> {
        Ok(())
    }

    fn destroy(&self) -> OniResult<()> {
        Ok(())
    }

    fn read_stream(&self, stream: ReadStream, buf: &mut [u8]) -> OniResult<usize> {
        match stream {
            ReadStream::Data => {
                self.data.lock().unwrap().fill(buf);
                Ok(buf.len())
            }
            ReadStream::Signal => {
                let mut queue = self.signal_queue.lock().unwrap();
                if queue.is_empty() {
                    return Err(OniError::ReadFailure);
                }
                for slot in buf.iter_mut() {
                    *slot = queue.pop_front().ok_or(OniError::ReadFailure)?;
                }
                Ok(buf.len())
            }
        }
    }

    fn write_stream(&self, stream: WriteStream, buf: &[u8]) -> OniResult<usize> {
        match stream {
            // The emulator swallows outbound data: bytes are accepted
            // and discarded, as if consumed by hardware.
            WriteStream::Data => Ok(buf.len()),
        }
    }

    fn read_config(&self, reg: u32) -> OniResult<u32> {
        Ok(self.config.lock().unwrap().get(reg))
    }

    fn write_config(&self, reg: u32, value: u32) -> OniResult<()> {
        let mut config = self.config.lock().unwrap();
        config.set(reg, value);
        if reg == registers::TRIG && value != 0 {
            self.commit_transaction(&mut config);
        }
        Ok(())
    }

    fn set_opt_callback(&self, _option: i32, _data: &[u8]) -> OniResult<()> {
        Ok(())
    }

    fn set_opt(&self, _option: i32, _data: &[u8]) -> OniResult<()> {
        Ok(())
    }

    fn get_opt(&self, _option: i32, _buf: &mut [u8]) -> OniResult<usize> {
        Ok(0)
    }

    fn info(&self) -> DriverInfo {
        DriverInfo {
            name: "emulator".into(),
            major: 1,
            minor: 0,
            patch: 0,
            pre_release: None,
        }
    }
}
