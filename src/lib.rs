//! Hardware-agnostic framing and control core for Open Neuro Interface
//! (ONI) acquisition devices.
//!
//! [`OniContext`] is the single public entry point: it owns a
//! dynamically loaded transport driver, discovers the device table,
//! and exposes register transactions plus zero-copy inbound/outbound
//! frame streaming. See the module docs on [`context`], [`driver`], and
//! [`cobs`] for the protocol details.

pub mod cobs;
pub mod context;
pub mod device;
pub mod driver;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod registers;
pub mod signal;

pub use context::{ContextOption, OniContext, RunState};
pub use device::{DeviceDescriptor, DeviceTable};
pub use driver::{DriverInfo, OniDriver, ReadStream, WriteStream};
pub use error::{OniError, OniResult};
pub use inbound::Frame;
pub use outbound::WriteFrame;
