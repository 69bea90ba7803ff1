//! PBus CLI - query and control PBus devices from the command line.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use pbus::config::{init_logging, Config};
use pbus::error::Result;
use pbus::protocol::Command;
use pbus::transport::{discover, Connection, ConnectionConfig, DiscoveryConfig};
use pbus::VERSION;

#[derive(Parser)]
#[command(name = "pbus", version = VERSION, about = "PBus device control")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Broadcast a discovery request and list responding devices
    Discover(DiscoverArgs),
    /// Read a byte range from device memory
    Read(ReadArgs),
    /// Write bytes to device memory
    Write(WriteArgs),
    /// Check whether a device answers at all
    Status(StatusArgs),
}

#[derive(Args)]
struct DiscoverArgs {
    /// Port to broadcast on
    #[arg(long)]
    port: Option<u16>,

    /// Seconds to collect replies
    #[arg(long)]
    window: Option<u64>,

    /// Address to probe, hex (0x-prefixed) or decimal
    #[arg(long, default_value = "0")]
    address: String,

    /// Bytes to read from each device
    #[arg(long, default_value_t = 4)]
    length: u32,
}

#[derive(Args)]
struct DeviceArgs {
    /// Device IP address
    #[arg(long)]
    host: Option<IpAddr>,

    /// Device UDP port
    #[arg(long)]
    port: Option<u16>,

    /// Request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Args)]
struct ReadArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Memory address, hex (0x-prefixed) or decimal
    address: String,

    /// Number of bytes to read
    length: u32,
}

#[derive(Args)]
struct StatusArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Address probed with a 4-byte read
    #[arg(long, default_value = "0")]
    address: String,
}

#[derive(Args)]
struct WriteArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Memory address, hex (0x-prefixed) or decimal
    address: String,

    /// Payload as a hex string, e.g. 0000803f
    data: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    config.logging.level = cli.log_level.clone();
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Discover(args) => run_discover(args, &config).await,
        Commands::Read(args) => run_read(args, &config).await,
        Commands::Write(args) => run_write(args, &config).await,
        Commands::Status(args) => run_status(args, &config).await,
    }
}

fn parse_address(input: &str) -> Result<u32> {
    let parsed = if let Some(hex) = input.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        input.parse()
    };
    parsed.map_err(|_| pbus::Error::Config(format!("invalid address: {input}")))
}

fn connection_config(args: &DeviceArgs, config: &Config) -> ConnectionConfig {
    let host = args.host.unwrap_or(config.device.host);
    let timeout = args
        .timeout_ms
        .map_or(config.device.timeout, Duration::from_millis);
    ConnectionConfig::new(host)
        .with_port(args.port.unwrap_or(config.device.port))
        .with_timeout(timeout)
}

async fn run_discover(args: DiscoverArgs, config: &Config) -> Result<()> {
    let mut discovery = config.discovery.clone();
    if let Some(port) = args.port {
        discovery.target = SocketAddr::new(discovery.target.ip(), port);
    }
    if let Some(secs) = args.window {
        discovery.window = Duration::from_secs(secs);
    }

    let address = parse_address(&args.address)?;
    let commands = [Command::read(address, args.length)];

    println!(
        "Broadcasting to {} ({}s window)...",
        discovery.target,
        discovery.window.as_secs_f64()
    );

    let devices = discover(&commands, &discovery).await;
    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    let mut peers: Vec<_> = devices.into_iter().collect();
    peers.sort_by_key(|(addr, _)| *addr);
    for (addr, responses) in peers {
        match responses.first() {
            Some(resp) if !resp.is_nak() => {
                let payload = resp.payload.as_deref().unwrap_or(&[]);
                println!("  {addr}  {:#010x} = {}", resp.address, hex::encode(payload));
            }
            Some(_) => println!("  {addr}  NAK"),
            None => println!("  {addr}  (empty reply)"),
        }
    }
    Ok(())
}

async fn run_read(args: ReadArgs, config: &Config) -> Result<()> {
    let address = parse_address(&args.address)?;
    let conn = Connection::new(connection_config(&args.device, config));
    conn.connect().await?;

    let result = conn
        .send_request(&[Command::read(address, args.length)], None)
        .await;
    conn.disconnect();

    let responses = result?;
    match responses.first() {
        Some(resp) if resp.is_nak() => println!("{address:#010x}: NAK"),
        Some(resp) => {
            let payload = resp.payload.as_deref().unwrap_or(&[]);
            println!("{address:#010x}: {}", hex::encode(payload));
        }
        None => println!("{address:#010x}: no response record"),
    }
    Ok(())
}

async fn run_status(args: StatusArgs, config: &Config) -> Result<()> {
    let address = parse_address(&args.address)?;
    let conn = Connection::new(connection_config(&args.device, config));
    let remote = conn.remote_addr();
    conn.connect().await?;
    let result = conn.send_request(&[Command::read(address, 4)], None).await;
    conn.disconnect();

    match result {
        Ok(responses) => match responses.first() {
            Some(resp) if resp.is_nak() => {
                println!("{remote}: reachable (probe read NAK)");
            }
            Some(_) => println!("{remote}: reachable"),
            None => println!("{remote}: reachable (empty reply)"),
        },
        Err(pbus::Error::Timeout) => println!("{remote}: no reply"),
        Err(err) => return Err(err),
    }
    Ok(())
}

async fn run_write(args: WriteArgs, config: &Config) -> Result<()> {
    let address = parse_address(&args.address)?;
    let payload = hex::decode(args.data.trim_start_matches("0x"))
        .map_err(|e| pbus::Error::Config(format!("invalid hex payload: {e}")))?;

    let conn = Connection::new(connection_config(&args.device, config));
    conn.connect().await?;

    let result = conn
        .send_request(&[Command::write(address, payload)], None)
        .await;
    conn.disconnect();

    let responses = result?;
    match responses.first() {
        Some(resp) if resp.is_nak() => println!("{address:#010x}: NAK"),
        Some(resp) => println!("{address:#010x}: wrote {} bytes", resp.declared_size),
        None => println!("{address:#010x}: no response record"),
    }
    Ok(())
}
