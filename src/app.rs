use std::path::PathBuf;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use log::{info, warn};
use tokio::signal;
use tokio::spawn;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigIO};
use crate::device::ble::{BleSettings, BleTransport};
use crate::device::connection::{spawn_session, SessionHandle};
use crate::device::types::{DeviceAddress, SessionEvent};
use crate::error::{readable_join_error, AppRunError, ConfigError, EncodeError, SessionError};
use crate::frame::{encode, operands_from_json};
use crate::print::{sample_invoice, spawn_print_job, PrintJob};

#[derive(Debug, Parser)]
#[command(version, about = "Claim a receipt printer, print, and release it")]
pub struct Cli {
    /// Claim this device address instead of the first one discovered
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a receipt that reports how long claiming the printer took
    Invoice,
    /// Sound the buzzer once per frame, pacing frames apart
    Fake {
        #[arg(long)]
        frames: Option<u8>,
    },
    /// Encode a JSON operand list such as '[27, 64, "hello\r\n", [10]]'
    Frame {
        json: String,
        /// Send the frame to the printer instead of only printing it as hex
        #[arg(long)]
        send: bool,
    },
    /// Write the effective configuration to the config file
    Config,
}

#[derive(Debug)]
enum JobKind {
    Invoice,
    Fake(u8),
    Frame(Vec<u8>),
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect::<Vec<_>>().join(" ")
}

pub fn parse_frame(json: &str) -> Result<Vec<u8>, EncodeError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|err| EncodeError::InvalidOperand {
        index: 0,
        reason: format!("not valid JSON: {}", err),
    })?;

    encode(&operands_from_json(&value)?)
}

async fn load_config(config_io: &ConfigIO) -> Result<Config, ConfigError> {
    match config_io.read().await {
        Ok(config) => Ok(config),
        Err(err) if err.is_file_not_found_error() => {
            info!("Config file not found, using defaults");
            Ok(Config::default())
        },
        Err(err) => Err(err),
    }
}

pub async fn run(cli: Cli) -> Result<(), AppRunError> {
    let config_io = match &cli.config {
        Some(path) => ConfigIO::open_sync(path.clone())?,
        None => ConfigIO::new_sync()?,
    };
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let mut config = load_config(&config_io).await?;
    if let Some(device) = cli.device {
        config.device_address = Some(device);
    }
    config.normalize();

    let kind = match cli.command {
        Command::Config => {
            config_io.save(&config).await?;
            return Ok(());
        },
        Command::Frame { json, send } => {
            let bytes = parse_frame(&json)?;
            println!("{}", hex(&bytes));
            if !send {
                return Ok(());
            }
            JobKind::Frame(bytes)
        },
        Command::Invoice => JobKind::Invoice,
        Command::Fake { frames } => JobKind::Fake(frames.unwrap_or(config.fake_print_frames)),
    };

    print_session(&config, kind).await
}

async fn print_session(config: &Config, kind: JobKind) -> Result<(), AppRunError> {
    let cancel = CancellationToken::new();
    let (event_sender, event_receiver) = unbounded();
    let (listener_sender, mut listener) = unbounded();

    let (transport, link_handle) = BleTransport::spawn(cancel.child_token(), BleSettings::from(config), event_sender);
    let session_cancel = cancel.child_token();
    let (session, session_handle) = spawn_session(
        session_cancel.clone(),
        transport,
        event_receiver,
        vec![listener_sender],
        config.release_settle(),
    );

    let interrupt = cancel.clone();
    spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, shutting down");
            interrupt.cancel();
        }
    });

    let result = claim_print_release(&session, &mut listener, config, kind, &cancel).await;

    // the session goes first so that a held claim is disconnected over a live link
    session_cancel.cancel();
    session_handle.await.map_err(|err| AppRunError::Join { message: readable_join_error(err) })?;
    cancel.cancel();
    link_handle.await.map_err(|err| AppRunError::Join { message: readable_join_error(err) })?;

    result
}

async fn next_event(listener: &mut UnboundedReceiver<SessionEvent>, cancel: &CancellationToken) -> Result<SessionEvent, AppRunError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AppRunError::Interrupted),
        event = listener.next() => event.ok_or(AppRunError::SessionError { source: SessionError::Stopped }),
    }
}

async fn wait_for_claim(listener: &mut UnboundedReceiver<SessionEvent>, cancel: &CancellationToken) -> Result<(), AppRunError> {
    loop {
        match next_event(listener, cancel).await? {
            SessionEvent::Claimed => return Ok(()),
            SessionEvent::NoDeviceFound => return Err(AppRunError::NoDeviceFound),
            SessionEvent::ClaimFailed { address } => return Err(AppRunError::ClaimFailed { address }),
            SessionEvent::ConnectionLost { address } => return Err(AppRunError::ConnectionLost { address }),
            _ => {},
        }
    }
}

async fn wait_for_release(listener: &mut UnboundedReceiver<SessionEvent>, cancel: &CancellationToken) -> Result<(), AppRunError> {
    loop {
        match next_event(listener, cancel).await? {
            SessionEvent::Released => return Ok(()),
            SessionEvent::ConnectionLost { .. } => return Ok(()),
            _ => {},
        }
    }
}

async fn claim_print_release(
    session: &SessionHandle,
    listener: &mut UnboundedReceiver<SessionEvent>,
    config: &Config,
    kind: JobKind,
    cancel: &CancellationToken,
) -> Result<(), AppRunError> {
    match config.device_address() {
        Some(address) => session.claim(address)?,
        None => session.request_claim(true)?,
    }
    wait_for_claim(listener, cancel).await?;

    let snapshot = session.snapshot();
    let job = match kind {
        JobKind::Invoice => {
            let address = snapshot.device_address.unwrap_or_else(|| DeviceAddress::new("?"));
            let frame = sample_invoice(&address, snapshot.claim_latency.unwrap_or_default())?;
            PrintJob::single(frame)
        },
        JobKind::Fake(frames) => PrintJob::fake(frames, config.frame_pacing())?,
        JobKind::Frame(bytes) => PrintJob::single(bytes),
    };

    let printed = spawn_print_job(cancel.child_token(), session.clone(), job)
        .await
        .map_err(|err| AppRunError::Join { message: readable_join_error(err) })?;

    match printed {
        Ok(_) => {
            info!("Invoice printed");
            session.release()?;
            wait_for_release(listener, cancel).await
        },
        Err(err) => {
            warn!("Failed printing invoice: {}", err);
            Err(err.into())
        },
    }
}
