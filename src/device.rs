//! Device table and hash index.
//!
//! After discovery, devices are sorted ascending by index and indexed by
//! an open-addressing hash so [`DeviceTable::find`] is O(1) amortized.

use crate::error::{OniError, OniResult};

/// Sentinel marking an empty hash slot (`idx` cannot legitimately be
/// `0xFFFFFFFF` since the top byte of a device index is a sub-address
/// field that never takes the value `0xFF` in a valid device).
const DEV_IDX_NULL: u32 = 0xFFFF_FFFF;

/// Overhead factor applied to the hash table relative to the device
/// count (`dev_hash_len = num_dev * 10 + 1`).
const HASH_OVERHEAD: u32 = 10;

/// An immutable device descriptor, as produced by discovery.
///
/// The device index is four 8-bit fields (hub/slot/position/subtype)
/// packed into a 32-bit address; this type does not interpret those
/// fields further, since splitting them is a presentation concern left
/// to callers (human-readable device/hub-ID tables are explicitly out
/// of scope for this core).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub idx: u32,
    pub id: u32,
    pub version: u32,
    pub read_size: u32,
    pub write_size: u32,
}

impl DeviceDescriptor {
    pub const WIRE_SIZE: usize = 20;

    pub fn is_readable(&self) -> bool {
        self.read_size > 0
    }

    pub fn is_writable(&self) -> bool {
        self.write_size > 0
    }

    /// Parse a little-endian `DeviceInstance` signal payload
    /// (`u32 idx, id, version, read_size, write_size`).
    pub fn from_wire(bytes: &[u8]) -> OniResult<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return Err(OniError::BadDeviceTable);
        }
        let mut read_u32 = {
            let mut offset = 0usize;
            move |bytes: &[u8]| {
                let value = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
                offset += 4;
                value
            }
        };
        Ok(DeviceDescriptor {
            idx: read_u32(bytes),
            id: read_u32(bytes),
            version: read_u32(bytes),
            read_size: read_u32(bytes),
            write_size: read_u32(bytes),
        })
    }
}

/// Fixed 32-bit mixing function used to seed the open-addressing probe
/// sequence, kept bit-for-bit stable so hash placement (and therefore
/// probe order under collisions) never changes across versions.
fn mix32(mut x: u32) -> u32 {
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9_f3b);
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9_f3b);
    (x >> 16) ^ x
}

/// Sorted device table plus its open-addressing hash index.
#[derive(Debug, Default, Clone)]
pub struct DeviceTable {
    devices: Vec<DeviceDescriptor>,
    hash: Vec<u32>, // indices into `devices`; DEV_IDX_NULL marks empty
}

impl DeviceTable {
    /// Build a table from devices in discovery (temporal) order.
    ///
    /// Sorts ascending by `idx`, checks for duplicate indices
    /// ([`OniError::RepeatedDeviceIndex`]), and rebuilds the hash.
    pub fn build(mut devices: Vec<DeviceDescriptor>) -> OniResult<Self> {
        devices.sort_by_key(|d| d.idx);
        for pair in devices.windows(2) {
            if pair[0].idx == pair[1].idx {
                return Err(OniError::RepeatedDeviceIndex);
            }
        }

        let hash_len = devices.len() as u32 * HASH_OVERHEAD + 1;
        let mut hash = vec![DEV_IDX_NULL; hash_len as usize];

        for (slot, device) in devices.iter().enumerate() {
            let mut probe = (mix32(device.idx) % hash_len) as usize;
            while hash[probe] != DEV_IDX_NULL {
                probe = (probe + 1) % hash_len as usize;
            }
            hash[probe] = slot as u32;
        }

        Ok(DeviceTable { devices, hash })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Look up a device by index. Returns [`OniError::BadDeviceIndex`] on
    /// a miss (sentinel reached before a match).
    pub fn find(&self, idx: u32) -> OniResult<&DeviceDescriptor> {
        if self.hash.is_empty() {
            return Err(OniError::BadDeviceIndex);
        }
        let hash_len = self.hash.len();
        let mut probe = (mix32(idx) % hash_len as u32) as usize;
        loop {
            let slot = self.hash[probe];
            if slot == DEV_IDX_NULL {
                return Err(OniError::BadDeviceIndex);
            }
            let device = &self.devices[slot as usize];
            if device.idx == idx {
                return Ok(device);
            }
            probe = (probe + 1) % hash_len;
        }
    }
}
