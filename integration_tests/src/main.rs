//! Integration tests for the UART-BLE bridge firmware.
//!
//! Run after flashing the firmware. A USB-UART adapter must be wired to the
//! bridge UART and the host must have a Bluetooth adapter.

mod ble_client;
mod device;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use ble_client::BleClient;
use device::{resolve_port, SerialClient};
use tests::{print_results, run_all_tests, Bench};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for the UART-BLE bridge firmware")]
struct Args {
    /// Serial port of the USB-UART adapter (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate of the bridged UART
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Advertised name of the bridge
    #[arg(long, default_value = "xiaoxiang BMS")]
    ble_name: String,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Resolve port (auto-detect if "auto")
    let port = resolve_port(&args.port)?;
    let scan_timeout = Duration::from_secs(args.scan_timeout);

    println!("{}", "UART-BLE Bridge Integration Tests".bold());
    println!("Port: {}", port);
    println!("Baud: {}", args.baud);
    println!("BLE:  {}", args.ble_name);
    println!();

    println!("Opening serial port...");
    let mut serial = SerialClient::new(&port, args.baud)?;
    serial.drain_buffer()?;

    println!("Scanning for '{}'...", args.ble_name);
    let ble = BleClient::connect_by_name(&args.ble_name, scan_timeout).await?;
    println!("{}", "Connected!".green());

    let mut bench = Bench {
        serial,
        ble,
        ble_name: args.ble_name,
        scan_timeout,
    };

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut bench).await;
    print_results(&results);

    bench.ble.disconnect().await.ok();

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
