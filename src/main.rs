//! Console front-end for an OpenBCI BLE session.
//!
//! Type `connect`, `disconnect`, `quit`, or a characteristic UUID from the
//! printed service tree to click it.

use anyhow::Result;
use clap::Parser;
use openbci_ble::domain::models::{MessageSeverity, ServiceDescriptor, UiEvent};
use openbci_ble::domain::session::{GattSessionController, SessionInfo};
use openbci_ble::domain::settings::SettingsService;
use openbci_ble::infrastructure::bluetooth::connection::BleConnection;
use openbci_ble::infrastructure::bluetooth::scanner;
use openbci_ble::infrastructure::bluetooth::{SessionCommand, SessionService};
use openbci_ble::infrastructure::logging;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "openbci-ble")]
#[command(about = "Browse and stream an OpenBCI Ganglion or Cyton over BLE")]
struct Cli {
    /// Device address to connect to
    #[arg(short, long)]
    address: Option<String>,
    /// Device name (or part of it) to connect to
    #[arg(short, long)]
    name: Option<String>,
    /// Scan duration in seconds
    #[arg(long)]
    scan_secs: Option<u64>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = SettingsService::new()?;
    if let Some(level) = &cli.log_level {
        settings.get_mut().log_settings.level = level.clone();
    }
    let _log_guard = logging::init_logger(&settings.get().log_settings)?;
    info!("Starting OpenBCI BLE session");

    let target = cli
        .address
        .or(cli.name)
        .or_else(|| settings.get().last_device_address.clone());
    let scan_secs = cli.scan_secs.unwrap_or(settings.get().scan_timeout_secs);

    let adapter = scanner::get_adapter().await?;
    let found =
        scanner::find_peripheral(&adapter, target.as_deref(), Duration::from_secs(scan_secs))
            .await?;
    if let Err(e) = settings.remember_device(found.name.clone(), found.address.clone()) {
        warn!("Could not save settings: {}", e);
    }

    let controller = GattSessionController::new(
        SessionInfo {
            device_name: found.name.clone(),
            device_address: found.address.clone(),
        },
        settings.get().session_config(),
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let transport = BleConnection::spawn(adapter, found.peripheral, event_tx);
    let service = SessionService::new(controller, transport, ui_tx);

    tokio::spawn(print_ui_events(ui_rx));
    tokio::spawn(read_commands(command_tx.clone()));
    let _ = command_tx.send(SessionCommand::Connect);

    service.run(event_rx, command_rx).await;
    Ok(())
}

fn parse_command(line: &str) -> Option<SessionCommand> {
    match line.trim() {
        "" => None,
        "connect" => Some(SessionCommand::Connect),
        "disconnect" => Some(SessionCommand::Disconnect),
        "quit" | "exit" => Some(SessionCommand::Shutdown),
        other => match Uuid::parse_str(other) {
            Ok(id) => Some(SessionCommand::Click(id)),
            Err(_) => {
                println!("Unknown command: {}", other);
                None
            }
        },
    }
}

async fn read_commands(commands: mpsc::UnboundedSender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let command = match lines.next_line().await {
            Ok(Some(line)) => parse_command(&line),
            // stdin closed
            Ok(None) | Err(_) => Some(SessionCommand::Shutdown),
        };
        if let Some(command) = command {
            let stop = command == SessionCommand::Shutdown;
            if commands.send(command).is_err() || stop {
                break;
            }
        }
    }
}

async fn print_ui_events(mut events: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UiEvent::ConnectionState(state) => println!("[state] {:?}", state),
            UiEvent::ServiceTree(services) => print_tree(&services),
            UiEvent::DataUpdated(value) => println!("[data] {:02X?}", value),
            UiEvent::Notice(notice) => {
                let tag = match notice.severity {
                    MessageSeverity::Info | MessageSeverity::Success => "info",
                    MessageSeverity::Warning => "warn",
                    MessageSeverity::Error => "error",
                };
                println!("[{}] {}", tag, notice.message);
            }
        }
    }
}

fn print_tree(services: &[ServiceDescriptor]) {
    if services.is_empty() {
        println!("[tree] (empty)");
        return;
    }
    for service in services {
        println!("[tree] {} {}", service.id, service.display_name);
        for characteristic in &service.characteristics {
            println!(
                "         {} {} {:?}",
                characteristic.id, characteristic.display_name, characteristic.properties
            );
        }
    }
}
