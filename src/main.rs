// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// XMODEM/YMODEM/ZMODEM transfer engine and serial host
mod crc;
mod error;
mod event;
mod protocol;
mod serial;
mod session;
mod xmodem;
mod ymodem;
mod zmodem;

use std::cell::RefCell;
use std::io::Write as _;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use log::debug;
use serialport::{DataBits, FlowControl, Parity, StopBits};

use event::{Event, SinkAction};
use serial::{LineEnding, RealSerialPort, SerialConfig, SerialPort};
use session::{Session, TransferProtocol};

/// Host-side stall budget; the engine itself is timer-less.
const STALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "smodem")]
#[command(about = "XMODEM/YMODEM/ZMODEM file transfer over RS-232 serial ports", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS")]
    stop_bits: u8,

    /// Flow control (none, hardware, or software)
    #[arg(long, default_value = "none")]
    flow: String,

    /// Local echo of typed characters (terminal setting)
    #[arg(long)]
    local_echo: bool,

    /// Line ending for terminal input (cr, lf, or crlf)
    #[arg(long, default_value = "cr")]
    line_ending: String,

    /// Transfer protocol (xmodem, xmodem-crc, xmodem-1k, ymodem, zmodem)
    #[arg(long, default_value = "zmodem")]
    protocol: String,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file
    Receive {
        /// Directory to save the received file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Wait for a ZMODEM sender's auto-start sequence before receiving
        #[arg(long)]
        wait_autostart: bool,
    },
    /// Send a serial break signal
    Break,
    /// List available serial ports
    List,
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!(
            "Invalid parity: {}. Must be 'none', 'odd', or 'even'",
            parity
        )),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn parse_flow_control(flow: &str) -> Result<FlowControl, String> {
    match flow.to_lowercase().as_str() {
        "none" => Ok(FlowControl::None),
        "hardware" | "rtscts" => Ok(FlowControl::Hardware),
        "software" | "xonxoff" => Ok(FlowControl::Software),
        _ => Err(format!(
            "Invalid flow control: {}. Must be 'none', 'hardware', or 'software'",
            flow
        )),
    }
}

fn parse_line_ending(ending: &str) -> Result<LineEnding, String> {
    match ending.to_lowercase().as_str() {
        "cr" => Ok(LineEnding::Cr),
        "lf" => Ok(LineEnding::Lf),
        "crlf" => Ok(LineEnding::CrLf),
        _ => Err(format!(
            "Invalid line ending: {}. Must be 'cr', 'lf', or 'crlf'",
            ending
        )),
    }
}

fn parse_protocol(protocol: &str) -> Result<TransferProtocol, String> {
    match protocol.to_lowercase().as_str() {
        "xmodem" => Ok(TransferProtocol::Xmodem),
        "xmodem-crc" => Ok(TransferProtocol::XmodemCrc),
        "xmodem-1k" => Ok(TransferProtocol::Xmodem1k),
        "ymodem" => Ok(TransferProtocol::Ymodem),
        "zmodem" => Ok(TransferProtocol::Zmodem),
        _ => Err(format!(
            "Invalid protocol: {}. Must be one of xmodem, xmodem-crc, xmodem-1k, ymodem, zmodem",
            protocol
        )),
    }
}

// ============================================================================
// Transfer driving
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Builds a session whose sink queues outbound bytes for the pump loop
/// and reports terminal events through `outcome`.
fn make_session(
    protocol: TransferProtocol,
    outgoing: Rc<RefCell<Vec<u8>>>,
    outcome: Rc<RefCell<Option<Outcome>>>,
) -> Session<'static> {
    Session::new(protocol, move |event: Event<'_>| {
        match event {
            Event::SendData(bytes) => outgoing.borrow_mut().extend_from_slice(bytes),
            Event::Started {
                file_name,
                file_size,
            } => match file_name {
                Some(name) => println!("Transfer started: {} ({} bytes)", name, file_size),
                None => println!("Transfer started"),
            },
            Event::Progress(progress) => {
                log::trace!(
                    "progress for {:?} in state {:?}",
                    progress.file_name,
                    progress.state
                );
                if progress.total_bytes > 0 {
                    print!(
                        "\r{} / {} bytes (block {}, {} errors)",
                        progress.bytes_transferred,
                        progress.total_bytes,
                        progress.current_block,
                        progress.error_count
                    );
                } else {
                    print!(
                        "\r{} bytes (block {}, {} errors)",
                        progress.bytes_transferred, progress.current_block, progress.error_count
                    );
                }
                std::io::stdout().flush().ok();
            }
            Event::Completed => {
                println!();
                *outcome.borrow_mut() = Some(Outcome::Completed);
            }
            Event::Failed(message) => {
                println!();
                *outcome.borrow_mut() = Some(Outcome::Failed(message.to_owned()));
            }
            Event::Cancelled => {
                println!();
                *outcome.borrow_mut() = Some(Outcome::Cancelled);
            }
        }
        SinkAction::Continue
    })
}

/// Shuttles bytes between the port and the session until the transfer
/// reaches a terminal state. Cancels the session when the line stalls
/// longer than `stall_timeout`.
fn pump_transfer(
    port: &mut dyn SerialPort,
    session: &mut Session<'_>,
    outgoing: &Rc<RefCell<Vec<u8>>>,
    stall_timeout: Duration,
) -> std::io::Result<()> {
    let mut buf = [0u8; 512];
    let mut last_activity = Instant::now();

    while session.is_active() {
        let pending = std::mem::take(&mut *outgoing.borrow_mut());
        if !pending.is_empty() {
            port.write_all(&pending)?;
            last_activity = Instant::now();
        }

        match port.read_timeout(&mut buf, Duration::from_millis(100)) {
            Ok(0) => {}
            Ok(n) => {
                last_activity = Instant::now();
                session.process_data(&buf[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Only give up when the line is truly quiet
                let buffered = port.bytes_available().unwrap_or(0);
                if buffered == 0 && last_activity.elapsed() >= stall_timeout {
                    eprintln!("Transfer stalled, cancelling");
                    session.cancel();
                }
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        "transfer finished: {:?} {:?} in state {:?}",
        session.protocol(),
        session.direction(),
        session.state()
    );

    // Flush whatever the terminal transition queued (ACKs, CANs, ZFIN)
    let pending = std::mem::take(&mut *outgoing.borrow_mut());
    if !pending.is_empty() {
        port.write_all(&pending)?;
    }
    Ok(())
}

/// Reads from the port until a ZMODEM auto-start signature shows up,
/// returning the tail of the stream so the new session can replay it.
fn wait_for_autostart(port: &mut dyn SerialPort) -> std::io::Result<Vec<u8>> {
    let mut seen: Vec<u8> = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        if !port.wait_for_data(Duration::from_millis(100))? {
            continue;
        }
        match port.read_timeout(&mut buf, Duration::from_millis(100)) {
            Ok(0) => {}
            Ok(n) => {
                seen.extend_from_slice(&buf[..n]);
                if session::detect_zmodem_autostart(&seen) {
                    return Ok(seen);
                }
                // Keep a bounded tail; the signature is at most 4 bytes
                if seen.len() > 4096 {
                    seen.drain(..seen.len() - 64);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }
    }
}

fn send_file(
    port: &mut dyn SerialPort,
    protocol: TransferProtocol,
    file: PathBuf,
) -> Result<(), String> {
    let data = std::fs::read(&file).map_err(|e| format!("Cannot read {}: {}", file.display(), e))?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("data.bin")
        .to_owned();

    port.flush_input().map_err(|e| format!("I/O error: {}", e))?;

    let outgoing = Rc::new(RefCell::new(Vec::new()));
    let outcome = Rc::new(RefCell::new(None));
    let mut session = make_session(protocol, Rc::clone(&outgoing), Rc::clone(&outcome));
    session
        .start_send(Some(&name), &data)
        .map_err(|e| e.to_string())?;

    pump_transfer(port, &mut session, &outgoing, STALL_TIMEOUT)
        .map_err(|e| format!("I/O error: {}", e))?;

    let final_outcome = outcome.borrow().clone();
    match final_outcome {
        Some(Outcome::Completed) => Ok(()),
        Some(Outcome::Failed(message)) => Err(format!("Transfer failed: {}", message)),
        Some(Outcome::Cancelled) => Err("Transfer cancelled".to_owned()),
        None => Err("Transfer ended without result".to_owned()),
    }
}

fn receive_file(
    port: &mut dyn SerialPort,
    protocol: TransferProtocol,
    output_dir: PathBuf,
    wait_autostart: bool,
) -> Result<(), String> {
    if !output_dir.exists() {
        return Err(format!(
            "Output directory not found: {}",
            output_dir.display()
        ));
    }

    let replay = if wait_autostart && protocol == TransferProtocol::Zmodem {
        println!("Waiting for ZMODEM sender...");
        wait_for_autostart(port).map_err(|e| format!("I/O error: {}", e))?
    } else {
        port.flush_input().map_err(|e| format!("I/O error: {}", e))?;
        Vec::new()
    };

    let outgoing = Rc::new(RefCell::new(Vec::new()));
    let outcome = Rc::new(RefCell::new(None));
    let mut session = make_session(protocol, Rc::clone(&outgoing), Rc::clone(&outcome));
    session.start_receive().map_err(|e| e.to_string())?;
    session.process_data(&replay);

    pump_transfer(port, &mut session, &outgoing, STALL_TIMEOUT)
        .map_err(|e| format!("I/O error: {}", e))?;

    let final_outcome = outcome.borrow().clone();
    match final_outcome {
        Some(Outcome::Completed) => {
            // Keep only the base name a peer declared
            let name = session
                .file_name()
                .and_then(|n| n.rsplit(['/', '\\']).next())
                .filter(|n| !n.is_empty())
                .unwrap_or("received.bin");
            let path = output_dir.join(name);
            std::fs::write(&path, session.received_data())
                .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
            println!(
                "Saved {} bytes to {}",
                session.received_data().len(),
                path.display()
            );
            Ok(())
        }
        Some(Outcome::Failed(message)) => Err(format!("Transfer failed: {}", message)),
        Some(Outcome::Cancelled) => Err("Transfer cancelled".to_owned()),
        None => Err("Transfer ended without result".to_owned()),
    }
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if let Commands::List = cli.command {
        let mut found = false;
        let result = serial::enumerate_ports(|name| {
            println!("{}", name);
            found = true;
        });
        if let Err(e) = result {
            eprintln!("Failed to enumerate ports: {}", e);
            std::process::exit(1);
        }
        if !found {
            println!("No serial ports found");
        }
        return;
    }

    let protocol = match parse_protocol(&cli.protocol) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let data_bits = match parse_data_bits(cli.data_bits) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let parity = match parse_parity(&cli.parity) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let stop_bits = match parse_stop_bits(cli.stop_bits) {
        Ok(sb) => sb,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let flow_control = match parse_flow_control(&cli.flow) {
        Ok(fc) => fc,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let line_ending = match parse_line_ending(&cli.line_ending) {
        Ok(le) => le,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let port_name = match cli.port {
        Some(name) => name,
        None => {
            eprintln!("Error: --port is required");
            std::process::exit(1);
        }
    };

    let config = SerialConfig {
        baud: cli.baud,
        data_bits,
        parity,
        stop_bits,
        flow_control,
        local_echo: cli.local_echo,
        line_ending,
    };

    println!("Opening serial port: {}", port_name);
    println!(
        "Settings: {} baud, {:?}, {:?}, {:?}, {:?}",
        config.baud, config.data_bits, config.parity, config.stop_bits, config.flow_control
    );
    println!(
        "Terminal: local echo {}, line ending {:?}",
        if config.local_echo { "on" } else { "off" },
        config.line_ending
    );

    let mut port: Box<dyn SerialPort> = match RealSerialPort::open(&port_name, &config) {
        Ok(port) => Box::new(port),
        Err(e) => {
            eprintln!("Failed to open serial port: {}", e);
            std::process::exit(1);
        }
    };

    // Raise the modem lines so DCE peers see us as ready
    if let Err(e) = port.set_dtr(true).and_then(|_| port.set_rts(true)) {
        eprintln!("Failed to raise modem lines: {}", e);
        std::process::exit(1);
    }
    match port.modem_status() {
        Ok(status) => debug!(
            "modem lines: DTR {} RTS {} CTS {} DSR {} DCD {} RI {}",
            status.dtr, status.rts, status.cts, status.dsr, status.dcd, status.ri
        ),
        Err(e) => debug!("modem status unavailable: {}", e),
    }

    let result = match cli.command {
        Commands::Send { file } => {
            println!("\nSending file: {}", file.display());
            send_file(port.as_mut(), protocol, file)
        }
        Commands::Receive {
            output_dir,
            wait_autostart,
        } => {
            println!("\nReceiving to: {}", output_dir.display());
            receive_file(port.as_mut(), protocol, output_dir, wait_autostart)
        }
        Commands::Break => port
            .flush_output()
            .and_then(|_| port.send_break())
            .map(|_| println!("Break sent"))
            .map_err(|e| format!("Failed to send break: {}", e)),
        Commands::List => unreachable!(),
    };

    match result {
        Ok(()) => println!("\nDone"),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
