//! Error taxonomy for the ONI core: the closed set of error codes the
//! ONI wire protocol and its `onidefs.h` register map define.

use thiserror::Error;

/// All failure modes the core can report.
///
/// Every variant corresponds to one negative error code in the ONI C
/// ABI; the mapping is preserved so driver authors and protocol dumps
/// translate directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OniError {
    #[error("invalid stream path")]
    InvalidStreamPath,

    #[error("invalid device ID")]
    BadDeviceId,

    #[error("invalid device index")]
    BadDeviceIndex,

    #[error("data size is not an integer multiple of the device's write size")]
    BadWriteSize,

    #[error("failed to read from a stream or register")]
    ReadFailure,

    #[error("failed to write to a stream or register")]
    WriteFailure,

    #[error("attempt to use a null context")]
    NullContext,

    #[error("failed to seek on stream")]
    SeekFailure,

    #[error("operation invalid for the current context run state")]
    InvalidState,

    #[error("invalid context option")]
    InvalidOption,

    #[error("invalid function arguments")]
    InvalidArg,

    #[error("invalid COBS packet")]
    BadCOBSPacket,

    #[error("attempted a hardware operation before a previous one completed")]
    Retrigger,

    #[error("supplied buffer is too small")]
    BufferTooSmall,

    #[error("badly formatted device table supplied by firmware")]
    BadDeviceTable,

    #[error("dynamic memory allocation failed")]
    BadAlloc,

    #[error("failed to close a resource")]
    CloseFailure,

    #[error("attempted to write a read-only object")]
    ReadOnly,

    #[error("specified but unimplemented feature")]
    Unimplemented,

    #[error("block read size is smaller than the maximal read frame size")]
    InvalidReadSize,

    #[error("frame read attempted with no readable devices in the device table")]
    NotReadable,

    #[error("hardware initialization failed")]
    InitFailure,

    #[error("attempted to read a write-only object")]
    WriteOnly,

    #[error("write buffer pre-allocation size is smaller than the maximal write frame size")]
    InvalidWriteSize,

    #[error("frame allocation attempted for a non-writable device")]
    NotWritable,

    #[error("device table contains repeated device indices")]
    RepeatedDeviceIndex,

    #[error("attempted to directly read or write a protected configuration option")]
    ProtectedConfig,

    #[error("received a malformed frame")]
    BadFrame,
}

impl From<libloading::Error> for OniError {
    fn from(_: libloading::Error) -> Self {
        OniError::InitFailure
    }
}

pub type OniResult<T> = Result<T, OniError>;
