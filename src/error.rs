use std::any::Any;
use std::io;
use thiserror::Error;
use std::str::Utf8Error;
use btleplug;
use serde_json;

use crate::device::types::{DeviceAddress, Phase};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Peripheral {address} is not known to any adapter")]
    PeripheralNotFound { address: DeviceAddress },

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("Writing to the peripheral took too long")]
    WriteTimeout,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Invalid operand at index {index}: {reason}")]
    InvalidOperand { index: usize, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("The session is {phase}, frames can only be sent while claimed")]
    NotClaimed { phase: Phase },

    #[error("The session task has stopped")]
    Stopped,
}

#[derive(Error, Debug)]
pub enum PrintError {
    #[error("Lost connection after {frames_sent} frame(s)")]
    ConnectionLost { frames_sent: usize },

    #[error("Print job was cancelled")]
    Cancelled,

    #[error("Failed to build frame: {source}")]
    Encode { #[from] source: EncodeError },

    #[error("Failed to send frame: {source}")]
    Session { #[from] source: SessionError },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("No paired device found")]
    NoDeviceFound,

    #[error("Failed claiming device {address}")]
    ClaimFailed { address: DeviceAddress },

    #[error("Lost connection to {address}")]
    ConnectionLost { address: DeviceAddress },

    #[error("Failed printing: {source}")]
    PrintError { #[from] source: PrintError },

    #[error("Invalid frame: {source}")]
    EncodeError { #[from] source: EncodeError },

    #[error("Session error: {source}")]
    SessionError { #[from] source: SessionError },

    #[error("Failed to join worker task: {message}")]
    Join { message: String },

    #[error("Failed to initialize logging: {source}")]
    Logging { #[from] source: fern::InitError },

    #[error("Interrupted")]
    Interrupted,
}

pub fn readable_thread_panic_error(error: &Box<dyn Any + Send + 'static>) -> String {
    let mut stringified = String::from("???");

    if let Some(s) = error.downcast_ref::<&str>() {
        stringified = format!("{}", s);
    }
    else if let Some(s) = error.downcast_ref::<String>() {
        stringified = format!("{}", s);
    }
    let type_id = error.type_id();

    format!("panic from thread: [{:?}]: [{}]", type_id, stringified)
}

pub fn readable_join_error(error: tokio::task::JoinError) -> String {
    if error.is_panic() {
        readable_thread_panic_error(&error.into_panic())
    } else {
        format!("{}", error)
    }
}
