//! Context state machine, option surface, and discovery routine.
//!
//! `OniContext` is the crate's single public entry point. It owns the
//! loaded driver, the device table, the current inbound/outbound
//! buffers, and the run state, and partitions its internal locking so
//! the acquisition thread (`read_frame`) and the control thread
//! (registers, options, `write_frame`) do not contend on unrelated
//! state.

use std::sync::{Arc, Mutex};

use tracing::{info, instrument};

use crate::device::{DeviceDescriptor, DeviceTable};
use crate::driver::{DynamicDriver, OniDriver};
use crate::error::{OniError, OniResult};
use crate::inbound::{Frame, InboundAssembler};
use crate::outbound::{OutboundBuilder, WriteFrame};
use crate::registers;
use crate::signal::{self, DEVICE_INSTANCE, DEVICE_TABLE_ACK};

const INBOUND_HEADER_SIZE: u32 = 16;
const OUTBOUND_HEADER_SIZE: u32 = 8;
const TRANSPORT_WORD_SIZE: u32 = 4;
const MIN_BLOCK_WRITE_SIZE: u32 = 4096;

fn round_up_word(n: u32) -> u32 {
    (n + TRANSPORT_WORD_SIZE - 1) / TRANSPORT_WORD_SIZE * TRANSPORT_WORD_SIZE
}

/// Context-level option indices. A distinct numbering space from the
/// config register addresses in [`crate::registers`] — several names
/// overlap (`Running`, `Reset`, ...) but index `7` here is `HwAddress`,
/// not `SysClkHz` as it is on the register side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ContextOption {
    DeviceTable = 0,
    NumDevices = 1,
    Running = 2,
    Reset = 3,
    SysClkHz = 4,
    AcqClkHz = 5,
    ResetAcqCounter = 6,
    HwAddress = 7,
    MaxReadFrameSize = 8,
    MaxWriteFrameSize = 9,
    BlockReadSize = 10,
    BlockWriteSize = 11,
    CustomBegin = 12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Idle,
    Running,
}

struct ControlState {
    run_state: RunState,
    device_table: DeviceTable,
    max_read_frame_size: u32,
    max_write_frame_size: u32,
    block_read_size: u32,
    block_write_size: u32,
}

impl ControlState {
    fn require_initialized(&self) -> OniResult<()> {
        if self.run_state == RunState::Uninitialized {
            Err(OniError::InvalidState)
        } else {
            Ok(())
        }
    }
}

/// The ONI acquisition/control context: the crate's single public
/// entry point.
pub struct OniContext {
    driver: Arc<dyn OniDriver>,
    inbound: Mutex<InboundAssembler>,
    outbound: Mutex<OutboundBuilder>,
    control: Mutex<ControlState>,
}

impl OniContext {
    /// Resolve `driver_name` as a dynamically loaded transport driver
    /// and build an uninitialized context around it.
    pub fn open(driver_name: &str) -> OniResult<Self> {
        let driver = DynamicDriver::load(driver_name)?;
        Ok(Self::with_driver(driver))
    }

    /// Build an uninitialized context around an already-resolved
    /// driver. Exposed so tests (and embedders with their own driver
    /// resolution) can bypass dynamic loading.
    pub fn with_driver(driver: Arc<dyn OniDriver>) -> Self {
        OniContext {
            driver,
            inbound: Mutex::new(InboundAssembler::new(0, 0)),
            outbound: Mutex::new(OutboundBuilder::new(0)),
            control: Mutex::new(ControlState {
                run_state: RunState::Uninitialized,
                device_table: DeviceTable::default(),
                max_read_frame_size: 0,
                max_write_frame_size: 0,
                block_read_size: 0,
                block_write_size: 0,
            }),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.control.lock().unwrap().run_state
    }

    /// `Uninitialized -> Idle`: opens the driver, triggers a reset, and
    /// runs discovery.
    #[instrument(skip(self))]
    pub fn init(&self, host_idx: i32) -> OniResult<()> {
        let mut control = self.control.lock().unwrap();
        if control.run_state != RunState::Uninitialized {
            return Err(OniError::InvalidState);
        }

        self.driver.init(host_idx)?;
        self.driver.write_config(registers::RESET, 1)?;
        self.run_discovery(&mut control)?;
        control.run_state = RunState::Idle;
        info!("context initialized");
        Ok(())
    }

    /// Re-run the discovery routine. Valid only from `Idle`.
    #[instrument(skip(self))]
    pub fn reset(&self) -> OniResult<()> {
        let mut control = self.control.lock().unwrap();
        if control.run_state != RunState::Idle {
            return Err(OniError::InvalidState);
        }
        self.driver.write_config(registers::RESET, 1)?;
        self.run_discovery(&mut control)?;
        Ok(())
    }

    #[instrument(skip(self, control))]
    fn run_discovery(&self, control: &mut ControlState) -> OniResult<()> {
        let (_, count_payload) =
            signal::pump_until_type_with_payload(self.driver.as_ref(), DEVICE_TABLE_ACK)?;
        if count_payload.len() < 4 {
            return Err(OniError::BadDeviceTable);
        }
        let num_devices = u32::from_le_bytes(count_payload[..4].try_into().unwrap());

        let mut devices = Vec::with_capacity(num_devices as usize);
        let mut max_read_frame_size = 0u32;
        let mut max_write_frame_size = 0u32;

        for _ in 0..num_devices {
            let (matched, payload) =
                signal::pump_until_type_with_payload(self.driver.as_ref(), DEVICE_INSTANCE)?;
            if matched != DEVICE_INSTANCE {
                return Err(OniError::BadDeviceTable);
            }
            let descriptor = DeviceDescriptor::from_wire(&payload)?;
            max_read_frame_size = max_read_frame_size.max(descriptor.read_size);
            max_write_frame_size = max_write_frame_size.max(descriptor.write_size);
            devices.push(descriptor);
        }

        control.device_table = DeviceTable::build(devices)?;
        control.max_read_frame_size = max_read_frame_size + INBOUND_HEADER_SIZE;
        control.max_write_frame_size = max_write_frame_size + OUTBOUND_HEADER_SIZE;
        control.block_read_size = round_up_word(control.max_read_frame_size);
        control.block_write_size =
            round_up_word(control.max_write_frame_size).max(MIN_BLOCK_WRITE_SIZE);

        self.inbound.lock().unwrap().set_sizes(
            control.max_read_frame_size as usize,
            control.block_read_size as usize,
        );
        self.outbound
            .lock()
            .unwrap()
            .set_block_write_size(control.block_write_size as usize);

        self.driver.set_opt_callback(
            ContextOption::BlockReadSize as i32,
            &control.block_read_size.to_le_bytes(),
        )?;

        info!(
            num_devices,
            max_read_frame_size = control.max_read_frame_size,
            max_write_frame_size = control.max_write_frame_size,
            "discovery complete"
        );
        Ok(())
    }

    // --- Option surface -------------------------------------------------

    pub fn device_table(&self) -> OniResult<Vec<DeviceDescriptor>> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        Ok(control.device_table.devices().to_vec())
    }

    pub fn num_devices(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        Ok(control.device_table.len() as u32)
    }

    pub fn is_running(&self) -> OniResult<bool> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        Ok(control.run_state == RunState::Running)
    }

    /// Transition `Idle -> Running` (`value == true`) or
    /// `Running -> Idle` (`value == false`); drops both current
    /// inbound/outbound buffers on either transition.
    #[instrument(skip(self))]
    pub fn set_running(&self, value: bool) -> OniResult<()> {
        let mut control = self.control.lock().unwrap();
        match (control.run_state, value) {
            (RunState::Idle, true) => {
                self.driver.write_config(registers::RUNNING, 1)?;
                control.run_state = RunState::Running;
            }
            (RunState::Running, false) => {
                self.driver.write_config(registers::RUNNING, 0)?;
                control.run_state = RunState::Idle;
            }
            _ => return Err(OniError::InvalidState),
        }
        self.inbound.lock().unwrap().drop_current_buffer();
        self.outbound.lock().unwrap().drop_current_buffer();
        info!(running = value, "run state transition");
        Ok(())
    }

    pub fn sys_clk_hz(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        self.driver.read_config(registers::SYS_CLK_HZ)
    }

    pub fn acq_clk_hz(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        self.driver.read_config(registers::ACQ_CLK_HZ)
    }

    pub fn reset_acq_counter(&self) -> OniResult<()> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        self.driver.write_config(registers::RESET_ACQ_COUNTER, 1)
    }

    pub fn hw_address(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        self.driver.read_config(registers::HW_ADDRESS)
    }

    pub fn set_hw_address(&self, value: u32) -> OniResult<()> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        self.driver.write_config(registers::HW_ADDRESS, value)
    }

    pub fn max_read_frame_size(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        Ok(control.max_read_frame_size)
    }

    pub fn max_write_frame_size(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        Ok(control.max_write_frame_size)
    }

    /// Reading requires `Idle` or `Running`.
    pub fn block_read_size(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        Ok(control.block_read_size)
    }

    pub fn block_write_size(&self) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        Ok(control.block_write_size)
    }

    /// Fails with [`OniError::InvalidReadSize`] unless `value` is at
    /// least `max_read_frame_size` and a multiple of the transport word
    /// size.
    pub fn set_block_read_size(&self, value: u32) -> OniResult<()> {
        let mut control = self.control.lock().unwrap();
        control.require_initialized()?;
        if value < control.max_read_frame_size || value % TRANSPORT_WORD_SIZE != 0 {
            return Err(OniError::InvalidReadSize);
        }
        control.block_read_size = value;
        self.inbound
            .lock()
            .unwrap()
            .set_sizes(control.max_read_frame_size as usize, value as usize);
        self.driver
            .set_opt_callback(ContextOption::BlockReadSize as i32, &value.to_le_bytes())
    }

    /// Fails with [`OniError::InvalidWriteSize`] unless `value` is at
    /// least `max_write_frame_size` and a multiple of the transport
    /// word size.
    pub fn set_block_write_size(&self, value: u32) -> OniResult<()> {
        let mut control = self.control.lock().unwrap();
        control.require_initialized()?;
        if value < control.max_write_frame_size || value % TRANSPORT_WORD_SIZE != 0 {
            return Err(OniError::InvalidWriteSize);
        }
        control.block_write_size = value;
        self.outbound
            .lock()
            .unwrap()
            .set_block_write_size(value as usize);
        self.driver
            .set_opt_callback(ContextOption::BlockWriteSize as i32, &value.to_le_bytes())
    }

    pub fn custom_option(&self, index: u32) -> OniResult<u32> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        self.driver.read_config(registers::CUSTOM_BEGIN + index)
    }

    pub fn set_custom_option(&self, index: u32, value: u32) -> OniResult<()> {
        let control = self.control.lock().unwrap();
        control.require_initialized()?;
        self.driver
            .write_config(registers::CUSTOM_BEGIN + index, value)
    }

    // --- Per-device register transactions --------------------------------

    pub fn write_register(&self, dev_idx: u32, reg_addr: u32, value: u32) -> OniResult<()> {
        registers::write_reg(self.driver.as_ref(), dev_idx, reg_addr, value)
    }

    pub fn read_register(&self, dev_idx: u32, reg_addr: u32) -> OniResult<u32> {
        registers::read_reg(self.driver.as_ref(), dev_idx, reg_addr)
    }

    // --- Streaming --------------------------------------------------------

    /// Read the next inbound frame. Requires `Running`, and at least one
    /// readable device in the table.
    pub fn read_frame(&self) -> OniResult<Frame> {
        {
            let control = self.control.lock().unwrap();
            if control.run_state != RunState::Running {
                return Err(OniError::InvalidState);
            }
            if !control.device_table.devices().iter().any(|d| d.is_readable()) {
                return Err(OniError::NotReadable);
            }
        }
        self.inbound.lock().unwrap().read_frame(self.driver.as_ref())
    }

    /// Build a write frame targeting `dev_idx`. Requires `Running`.
    pub fn create_write_frame(&self, dev_idx: u32, data: &[u8]) -> OniResult<WriteFrame> {
        let device = {
            let control = self.control.lock().unwrap();
            if control.run_state != RunState::Running {
                return Err(OniError::InvalidState);
            }
            *control.device_table.find(dev_idx)?
        };
        self.outbound.lock().unwrap().create_frame(&device, data)
    }

    /// Send a write frame built by [`OniContext::create_write_frame`].
    pub fn write_frame(&self, frame: &WriteFrame) -> OniResult<usize> {
        let outbound = self.outbound.lock().unwrap();
        outbound.write_frame(self.driver.as_ref(), frame)
    }

    /// `any -> destroy`: releases the driver. Consumes the context;
    /// the device table and hash are freed by ordinary `Drop`.
    pub fn destroy(self) -> OniResult<()> {
        self.driver.destroy()
    }
}
