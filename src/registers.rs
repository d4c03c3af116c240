//! Register transaction engine.
//!
//! A register read or write is a latch-then-trigger exchange over the
//! driver's configuration interface: the four preamble fields are
//! latched with plain config writes, then `Trig` is written to commit
//! the transaction to hardware, and the outcome is observed by pumping
//! the signal channel for an ACK/NACK.

use crate::driver::OniDriver;
use crate::error::{OniError, OniResult};
use crate::signal::{
    self, CONFIG_READ_ACK, CONFIG_READ_NACK, CONFIG_WRITE_ACK, CONFIG_WRITE_NACK,
};

/// Configuration register addresses, stable across transport drivers.
pub const DEV_IDX: u32 = 0;
pub const REG_ADDR: u32 = 1;
pub const REG_VALUE: u32 = 2;
pub const RW: u32 = 3;
pub const TRIG: u32 = 4;
pub const RUNNING: u32 = 5;
pub const RESET: u32 = 6;
pub const SYS_CLK_HZ: u32 = 7;
pub const ACQ_CLK_HZ: u32 = 8;
pub const RESET_ACQ_COUNTER: u32 = 9;
pub const HW_ADDRESS: u32 = 10;
pub const CUSTOM_BEGIN: u32 = 11;

/// Write `value` to `reg_addr` on device `dev_idx`.
///
/// Fails with [`OniError::Retrigger`] if a previous transaction's
/// trigger has not yet cleared, and [`OniError::WriteFailure`] if the
/// hardware NACKs.
pub fn write_reg(driver: &dyn OniDriver, dev_idx: u32, reg_addr: u32, value: u32) -> OniResult<()> {
    if driver.read_config(TRIG)? != 0 {
        return Err(OniError::Retrigger);
    }

    driver.write_config(DEV_IDX, dev_idx)?;
    driver.write_config(REG_ADDR, reg_addr)?;
    driver.write_config(REG_VALUE, value)?;
    driver.write_config(RW, 1)?;
    driver.write_config(TRIG, 1)?;

    let matched = signal::pump_until_type(driver, CONFIG_WRITE_ACK | CONFIG_WRITE_NACK)?;
    if matched == CONFIG_WRITE_NACK {
        return Err(OniError::WriteFailure);
    }
    Ok(())
}

/// Read the current value of `reg_addr` on device `dev_idx`.
///
/// Fails with [`OniError::Retrigger`] if a previous transaction's
/// trigger has not yet cleared, and [`OniError::ReadFailure`] if the
/// hardware NACKs.
pub fn read_reg(driver: &dyn OniDriver, dev_idx: u32, reg_addr: u32) -> OniResult<u32> {
    if driver.read_config(TRIG)? != 0 {
        return Err(OniError::Retrigger);
    }

    driver.write_config(DEV_IDX, dev_idx)?;
    driver.write_config(REG_ADDR, reg_addr)?;
    driver.write_config(RW, 0)?;
    driver.write_config(TRIG, 1)?;

    let matched = signal::pump_until_type(driver, CONFIG_READ_ACK | CONFIG_READ_NACK)?;
    if matched == CONFIG_READ_NACK {
        return Err(OniError::ReadFailure);
    }
    driver.read_config(REG_VALUE)
}
