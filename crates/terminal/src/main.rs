//! usb-hid-terminal
//!
//! Interactive terminal for USB HID devices: list attached devices, attach
//! to one, watch its reports and send it text or numeric payloads.

use anyhow::{Context, Result};
use clap::Parser;
use common::{TerminalBridge, TerminalCommand, TerminalEvent, setup_logging};
use protocol::SendEncoding;
use terminal::TerminalConfig;
use terminal::console::{self, Action};
use terminal::spawn_terminal_controller;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "hid-terminal")]
#[command(author, version, about = "USB HID Terminal - talk to USB HID devices")]
#[command(long_about = "
An interactive terminal for USB HID devices. Claims every interface of the
selected device, prints every report it sends and writes typed payloads to
its OUT endpoints.

EXAMPLES:
    # Start the interactive console
    hid-terminal

    # Send numeric payloads (\"10 0x1F 255\") by default
    hid-terminal --numeric

    # List USB devices and exit
    hid-terminal --list-devices

    # Run with debug logging
    hid-terminal --log-level debug

CONFIGURATION:
    The terminal looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-hid-terminal/terminal.toml
    3. /etc/usb-hid-terminal/terminal.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Encode payloads as numeric tokens instead of raw text
    #[arg(short, long)]
    numeric: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = TerminalConfig::default();
        let path = TerminalConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        TerminalConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        TerminalConfig::load_or_default()
    };
    if args.numeric {
        config.terminal.default_encoding = SendEncoding::NumericTokens;
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.terminal.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-hid-terminal v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let (bridge, worker) = common::create_terminal_bridge();
    let controller_handle = spawn_terminal_controller(worker, &config)
        .context("Failed to spawn terminal controller thread")?;

    let result = if args.list_devices {
        list_devices_mode(&bridge).await
    } else {
        run_console(&bridge, config.terminal.default_encoding).await
    };

    info!("Shutting down terminal controller...");
    if let Err(e) = bridge.send_command(TerminalCommand::Shutdown).await {
        error!("Error shutting down terminal controller: {:#}", e);
    }

    match controller_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Terminal controller failed: {:#}", e),
        Err(e) => error!("Terminal controller thread panicked: {:?}", e),
    }

    result
}

/// List USB devices and exit
async fn list_devices_mode(bridge: &TerminalBridge) -> Result<()> {
    bridge
        .send_command(TerminalCommand::EnumerateDevices)
        .await
        .context("Failed to send EnumerateDevices command")?;

    loop {
        match bridge
            .recv_event()
            .await
            .context("Failed to receive device list")?
        {
            event @ TerminalEvent::DevicesListed { .. } => {
                println!("{}", console::render_event(&event));
                return Ok(());
            }
            TerminalEvent::CommandFailed { message } => {
                anyhow::bail!("Failed to enumerate devices: {}", message)
            }
            _ => {}
        }
    }
}

/// Interactive console until `quit`, end of input or Ctrl+C
async fn run_console(bridge: &TerminalBridge, encoding: SendEncoding) -> Result<()> {
    println!("usb-hid-terminal: send encoding {:?}. Type 'help' for commands.", encoding);

    // Printer task: events are rendered as they arrive
    let printer_bridge = bridge.clone();
    let printer = tokio::spawn(async move {
        while let Ok(event) = printer_bridge.recv_event().await {
            println!("{}", console::render_event(&event));
        }
    });

    bridge
        .send_command(TerminalCommand::EnumerateDevices)
        .await
        .context("Failed to send EnumerateDevices command")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match console::parse_input_line(&line) {
                    Ok(Action::Command(cmd)) => bridge
                        .send_command(cmd)
                        .await
                        .context("Failed to send command")?,
                    Ok(Action::ShowHelp) => println!("{}", console::HELP),
                    Ok(Action::Quit) => break,
                    Ok(Action::None) => {}
                    Err(e) => println!("! {}", e),
                }
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    printer.abort();
    Ok(())
}
