// src/error.rs

use crate::model::Capability;
use nusb::transfer::TransferError;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `oceanoptics-rs` library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No Ocean Optics {model} spectrometer found (vendor id {vendor_id:#06x}). Is it connected?")]
    DeviceNotFound { model: String, vendor_id: u16 },

    #[error("{count} {model} spectrometers match and the selection requires exactly one")]
    AmbiguousDevice { model: String, count: usize },

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Timeout on endpoint {endpoint:#04x} after {after:?}")]
    Timeout { endpoint: u8, after: Duration },

    #[error("Short read on endpoint {endpoint:#04x}: expected {expected} bytes, got {actual}")]
    ShortRead {
        endpoint: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("request_spectrum: wrong sync byte {0:#04x}")]
    SpectrumSync(u8),

    #[error("Initialization {stage} failed after {attempts} attempts: {last}")]
    Initialization {
        stage: &'static str,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    #[error("{capability} is not supported by the {model}")]
    Unsupported { model: String, capability: Capability },
}

impl Error {
    /// Bus-level failures: the only class the initialization retries absorb.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Usb(_) | Error::Transfer(_) | Error::Timeout { .. } | Error::ShortRead { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
