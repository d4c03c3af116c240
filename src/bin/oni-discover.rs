//! Thin demonstration binary: opens a context against a named transport
//! driver, runs discovery, prints the device table, and exits. Holds no
//! process-wide state and is deliberately not a REPL — option parsing,
//! dump-file output, and interactive loops are out of scope for the
//! core (see `oni_core`'s crate docs).

use clap::Parser;
use tracing_subscriber::EnvFilter;

use oni_core::{OniContext, OniResult};

#[derive(Parser, Debug)]
#[command(author, version, about = "Discover ONI devices through a transport driver")]
struct Args {
    /// Short name of the transport driver to load, e.g. `emulator` for
    /// `libonidriver_emulator.so`.
    driver: String,

    /// Host index passed to the driver's `init`; negative selects the
    /// driver's default.
    #[arg(long, default_value_t = -1)]
    host_idx: i32,
}

fn main() -> OniResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let ctx = OniContext::open(&args.driver)?;
    ctx.init(args.host_idx)?;

    let devices = ctx.device_table()?;
    println!("discovered {} device(s):", devices.len());
    for device in devices {
        println!(
            "  idx=0x{:08x} id={} version={} read_size={} write_size={}",
            device.idx, device.id, device.version, device.read_size, device.write_size
        );
    }

    ctx.destroy()?;
    Ok(())
}
