//! Transport driver abstraction.
//!
//! A driver translates the core's uniform operation set onto one
//! concrete transport (PCIe-class DMA, USB3 bulk, ...). This module
//! defines the *contract* only — [`OniDriver`] is the trait every
//! transport backend must implement, and [`DynamicDriver`] is the
//! adapter that resolves one from a platform shared library at runtime.
//! Concrete transport backends themselves are out of scope for this core.

use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int};
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::error::{OniError, OniResult};

/// Which inbound stream a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReadStream {
    Data = 0,
    Signal = 1,
}

/// Which outbound stream a write targets. Only `Data` is writable; the
/// signal channel is host-to-device only in the other direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum WriteStream {
    Data = 0,
}

/// Driver identification, returned by [`OniDriver::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: String,
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    pub pre_release: Option<String>,
}

/// The fixed operation set a transport driver must implement.
///
/// Implementors must be reentrant only to the extent that the core
/// itself serializes calls per stream (at most one concurrent `Data`
/// reader, one concurrent `Data` writer, and one concurrent `Signal`
/// reader/writer) — see the crate-level concurrency notes in
/// [`crate::context`].
pub trait OniDriver: Send + Sync {
    fn init(&self, host_idx: i32) -> OniResult<()>;
    fn destroy(&self) -> OniResult<()>;

    /// Block until `buf.len()` bytes have been read, or return an error.
    /// Returns the number of bytes actually read (drivers may perform
    /// short reads that the caller must loop on for partial progress).
    fn read_stream(&self, stream: ReadStream, buf: &mut [u8]) -> OniResult<usize>;

    /// Write `buf` to `stream`. May perform a short write; the caller
    /// loops until all bytes are sent.
    fn write_stream(&self, stream: WriteStream, buf: &[u8]) -> OniResult<usize>;

    fn read_config(&self, reg: u32) -> OniResult<u32>;
    fn write_config(&self, reg: u32, value: u32) -> OniResult<()>;

    /// Called after the core has applied a context-level option, so the
    /// driver can react (e.g. resize DMA buffers when `BlockReadSize`
    /// changes).
    fn set_opt_callback(&self, option: i32, data: &[u8]) -> OniResult<()>;

    fn set_opt(&self, option: i32, data: &[u8]) -> OniResult<()>;
    fn get_opt(&self, option: i32, buf: &mut [u8]) -> OniResult<usize>;

    fn info(&self) -> DriverInfo;
}

// --- Dynamically loaded driver adapter --------------------------------

#[repr(C)]
struct CDriverInfo {
    name: *const c_char,
    major: c_int,
    minor: c_int,
    patch: c_int,
    pre_release: *const c_char,
}

type CreateCtxFn = unsafe extern "C" fn() -> *mut c_void;
type InitFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type DestroyCtxFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type ReadStreamFn = unsafe extern "C" fn(*mut c_void, c_int, *mut c_void, usize) -> isize;
type WriteStreamFn = unsafe extern "C" fn(*mut c_void, c_int, *const c_char, usize) -> isize;
type ReadConfigFn = unsafe extern "C" fn(*mut c_void, u32, *mut u32) -> c_int;
type WriteConfigFn = unsafe extern "C" fn(*mut c_void, u32, u32) -> c_int;
type SetOptFn = unsafe extern "C" fn(*mut c_void, c_int, *const c_void, usize) -> c_int;
type GetOptFn = unsafe extern "C" fn(*mut c_void, c_int, *mut c_void, *mut usize) -> c_int;
type InfoFn = unsafe extern "C" fn() -> *const CDriverInfo;

/// A driver resolved from a dynamically loaded shared library.
///
/// Symbols are named `oni_driver_<op>` (e.g. `oni_driver_read_stream`)
/// and resolved once at construction; a missing symbol fails driver
/// creation rather than failing lazily on first use.
pub struct DynamicDriver {
    // Kept alive for the lifetime of the resolved symbols below; never
    // read directly again once the function pointers are cached.
    _library: Library,
    ctx: *mut c_void,
    create_ctx: CreateCtxFn,
    init: InitFn,
    destroy_ctx: DestroyCtxFn,
    read_stream: ReadStreamFn,
    write_stream: WriteStreamFn,
    read_config: ReadConfigFn,
    write_config: WriteConfigFn,
    set_opt_callback: SetOptFn,
    set_opt: SetOptFn,
    get_opt: GetOptFn,
    info: InfoFn,
}

// SAFETY: every call into the driver is mediated by `OniContext`, which
// serializes calls per the contract documented on `OniDriver`. The
// driver's own state (`ctx`) is only ever touched through those calls.
unsafe impl Send for DynamicDriver {}
unsafe impl Sync for DynamicDriver {}

impl DynamicDriver {
    /// Resolve `libonidriver_<name>.<ext>` (platform-dependent prefix and
    /// extension) and bind its `oni_driver_*` symbol table.
    pub fn load(name: &str) -> OniResult<Arc<dyn OniDriver>> {
        let file_name = platform_library_name(name);

        // SAFETY: loading an arbitrary shared library is inherently
        // unsafe; the caller is trusted to name a driver that honors the
        // `oni_driver_*` ABI documented in this module.
        let library = unsafe { Library::new(&file_name) }?;

        macro_rules! load_symbol {
            ($sym:literal, $ty:ty) => {{
                // SAFETY: `$ty` must match the exported symbol's real
                // signature; this is the core/driver ABI boundary.
                let symbol: Symbol<$ty> = unsafe { library.get($sym) }?;
                *symbol
            }};
        }

        let create_ctx: CreateCtxFn = load_symbol!(b"oni_driver_create_ctx\0", CreateCtxFn);
        let init: InitFn = load_symbol!(b"oni_driver_init\0", InitFn);
        let destroy_ctx: DestroyCtxFn = load_symbol!(b"oni_driver_destroy_ctx\0", DestroyCtxFn);
        let read_stream: ReadStreamFn = load_symbol!(b"oni_driver_read_stream\0", ReadStreamFn);
        let write_stream: WriteStreamFn = load_symbol!(b"oni_driver_write_stream\0", WriteStreamFn);
        let read_config: ReadConfigFn = load_symbol!(b"oni_driver_read_config\0", ReadConfigFn);
        let write_config: WriteConfigFn = load_symbol!(b"oni_driver_write_config\0", WriteConfigFn);
        let set_opt_callback: SetOptFn =
            load_symbol!(b"oni_driver_set_opt_callback\0", SetOptFn);
        let set_opt: SetOptFn = load_symbol!(b"oni_driver_set_opt\0", SetOptFn);
        let get_opt: GetOptFn = load_symbol!(b"oni_driver_get_opt\0", GetOptFn);
        let info: InfoFn = load_symbol!(b"oni_driver_info\0", InfoFn);

        // SAFETY: `create_ctx` is one of the resolved, ABI-matching symbols.
        let ctx = unsafe { create_ctx() };
        if ctx.is_null() {
            return Err(OniError::InitFailure);
        }

        Ok(Arc::new(DynamicDriver {
            _library: library,
            ctx,
            create_ctx,
            init,
            destroy_ctx,
            read_stream,
            write_stream,
            read_config,
            write_config,
            set_opt_callback,
            set_opt,
            get_opt,
            info,
        }))
    }
}

fn platform_library_name(name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("onidriver_{name}.dll")
    }
    #[cfg(target_os = "macos")]
    {
        format!("libonidriver_{name}.dylib")
    }
    #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
    {
        format!("libonidriver_{name}.so")
    }
}

impl OniDriver for DynamicDriver {
    fn init(&self, host_idx: i32) -> OniResult<()> {
        // SAFETY: `ctx` was produced by this same driver's `create_ctx`.
        let rc = unsafe { (self.init)(self.ctx, host_idx) };
        check(rc)
    }

    fn destroy(&self) -> OniResult<()> {
        let rc = unsafe { (self.destroy_ctx)(self.ctx) };
        check(rc)
    }

    fn read_stream(&self, stream: ReadStream, buf: &mut [u8]) -> OniResult<usize> {
        let rc = unsafe {
            (self.read_stream)(
                self.ctx,
                stream as c_int,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
            )
        };
        check_len(rc)
    }

    fn write_stream(&self, stream: WriteStream, buf: &[u8]) -> OniResult<usize> {
        let rc = unsafe {
            (self.write_stream)(
                self.ctx,
                stream as c_int,
                buf.as_ptr() as *const c_char,
                buf.len(),
            )
        };
        check_len(rc)
    }

    fn read_config(&self, reg: u32) -> OniResult<u32> {
        let mut value: u32 = 0;
        let rc = unsafe { (self.read_config)(self.ctx, reg, &mut value) };
        check(rc)?;
        Ok(value)
    }

    fn write_config(&self, reg: u32, value: u32) -> OniResult<()> {
        let rc = unsafe { (self.write_config)(self.ctx, reg, value) };
        check(rc)
    }

    fn set_opt_callback(&self, option: i32, data: &[u8]) -> OniResult<()> {
        let rc = unsafe {
            (self.set_opt_callback)(self.ctx, option, data.as_ptr() as *const c_void, data.len())
        };
        check(rc)
    }

    fn set_opt(&self, option: i32, data: &[u8]) -> OniResult<()> {
        let rc =
            unsafe { (self.set_opt)(self.ctx, option, data.as_ptr() as *const c_void, data.len()) };
        check(rc)
    }

    fn get_opt(&self, option: i32, buf: &mut [u8]) -> OniResult<usize> {
        let mut len = buf.len();
        let rc =
            unsafe { (self.get_opt)(self.ctx, option, buf.as_mut_ptr() as *mut c_void, &mut len) };
        check(rc)?;
        Ok(len)
    }

    fn info(&self) -> DriverInfo {
        // SAFETY: `info` is resolved from the driver's ABI-matching symbol
        // table and returns a pointer to static storage owned by the
        // driver library, valid for the library's lifetime.
        unsafe {
            let raw = (self.info)();
            let name = c_str_to_string(raw.as_ref().map(|i| i.name).unwrap_or(std::ptr::null()));
            let pre_release = raw
                .as_ref()
                .and_then(|i| (!i.pre_release.is_null()).then(|| c_str_to_string(i.pre_release)));
            DriverInfo {
                name,
                major: raw.as_ref().map(|i| i.major).unwrap_or(0),
                minor: raw.as_ref().map(|i| i.minor).unwrap_or(0),
                patch: raw.as_ref().map(|i| i.patch).unwrap_or(0),
                pre_release,
            }
        }
    }
}

unsafe fn c_str_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

fn check(rc: c_int) -> OniResult<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(rc_to_error(rc))
    }
}

fn check_len(rc: isize) -> OniResult<usize> {
    if rc < 0 {
        Err(rc_to_error(rc as c_int))
    } else {
        Ok(rc as usize)
    }
}

/// Translate a driver's negative C-style return code into [`OniError`].
/// Drivers beyond the contract's scope may return codes outside the
/// documented set; anything unrecognized maps to a generic transport
/// failure rather than panicking.
fn rc_to_error(rc: c_int) -> OniError {
    match rc {
        -1 => OniError::InvalidStreamPath,
        -2 => OniError::BadDeviceId,
        -3 => OniError::BadDeviceIndex,
        -5 => OniError::ReadFailure,
        -6 => OniError::WriteFailure,
        -8 => OniError::SeekFailure,
        -22 => OniError::InitFailure,
        _ => OniError::ReadFailure,
    }
}

/// Helper for drivers embedding a static `oni_driver_info_t`-equivalent;
/// primarily useful to in-process test drivers that want to mimic the C
/// ABI's `CString` ownership story.
#[allow(dead_code)]
pub(crate) fn leak_c_string(s: &str) -> *const c_char {
    CString::new(s).expect("driver name must not contain NUL").into_raw()
}
