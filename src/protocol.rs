//! # Ocean Optics legacy USB command protocol
//!
//! The spectrometers covered here (USB2000 / HR2000 / USB2000+ / USB4000
//! family) accept single-byte opcodes, optionally followed by a little-endian
//! argument, on one bulk OUT endpoint. Responses arrive on a bulk IN endpoint
//! chosen by the model table.
//!
//! ## Command set
//!
//! | Opcode | Command            | Argument | Response                       |
//! |--------|--------------------|----------|--------------------------------|
//! | `0x01` | Initialize         | none     | none                           |
//! | `0x02` | SetIntegrationTime | u32 µs   | none                           |
//! | `0x04` | SetShutdownMode    | u16      | none                           |
//! | `0x05` | QueryInformation   | u8 slot  | `0x05`, slot, NUL-terminated text |
//! | `0x09` | RequestSpectrum    | none     | N packets + sync byte `0x69`   |
//! | `0x0A` | SetTriggerMode     | u16      | none                           |
//! | `0xFE` | QueryStatus        | none     | 16-byte status record          |
//!
//! [`Channel`] pairs a [`Transport`] with the model's endpoints and speaks this
//! command set; it holds no protocol state of its own.

use crate::error::{Error, Result};
use crate::model::EndpointConfig;
use crate::status::DeviceStatus;
use crate::transport::Transport;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::time::Duration;
use strum_macros::Display;
use tracing::debug;

// --- Constants ---

pub const OCEAN_OPTICS_VID: u16 = 0x2457;

/// Trailing marker after the last spectrum packet.
pub const SYNC_BYTE: u8 = 0x69;

/// `usb_speed` status value of a high-speed link.
pub const HIGH_SPEED: u8 = 0x80;

/// QueryInformation slot holding the serial number.
pub const SERIAL_NUMBER_SLOT: u8 = 0;

/// QueryInformation slots holding wavelength coefficients 0..=3.
pub const WAVELENGTH_SLOTS: std::ops::RangeInclusive<u8> = 1..=4;

/// QueryInformation slots holding nonlinearity coefficients 0..=7.
pub const NONLINEARITY_SLOTS: std::ops::RangeInclusive<u8> = 6..=13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Initialize = 0x01,
    SetIntegrationTime = 0x02,
    SetShutdownMode = 0x04,
    QueryInformation = 0x05,
    RequestSpectrum = 0x09,
    SetTriggerMode = 0x0A,
    QueryStatus = 0xFE,
}

/// Acquisition trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum TriggerMode {
    #[default]
    #[strum(to_string = "normal")]
    Normal = 0,
    #[strum(to_string = "software")]
    Software = 1,
    #[strum(to_string = "external synchronization")]
    ExternalSynchronization = 2,
    #[strum(to_string = "external hardware")]
    ExternalHardware = 3,
}

/// A host-to-device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Initialize,
    SetIntegrationTime { micros: u32 },
    SetShutdownMode { powered: bool },
    QueryInformation { slot: u8 },
    RequestSpectrum,
    SetTriggerMode(TriggerMode),
    QueryStatus,
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Initialize => Opcode::Initialize,
            Command::SetIntegrationTime { .. } => Opcode::SetIntegrationTime,
            Command::SetShutdownMode { .. } => Opcode::SetShutdownMode,
            Command::QueryInformation { .. } => Opcode::QueryInformation,
            Command::RequestSpectrum => Opcode::RequestSpectrum,
            Command::SetTriggerMode(_) => Opcode::SetTriggerMode,
            Command::QueryStatus => Opcode::QueryStatus,
        }
    }

    /// Wire encoding: opcode byte followed by the little-endian argument.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(self.opcode().into());
        match *self {
            Command::SetIntegrationTime { micros } => buf.put_u32_le(micros),
            Command::SetShutdownMode { powered } => buf.put_u16_le(u16::from(powered)),
            Command::QueryInformation { slot } => buf.put_u8(slot),
            Command::SetTriggerMode(mode) => buf.put_u16_le(mode.into()),
            Command::Initialize | Command::RequestSpectrum | Command::QueryStatus => {}
        }
        buf.freeze()
    }
}

/// Validate a QueryInformation response and extract its text payload.
///
/// The device echoes the opcode and the slot number (modulo 255), then sends
/// NUL-terminated text.
pub fn parse_information(slot: u8, response: &[u8]) -> Result<String> {
    let expected_slot = slot % 0xFF;
    match response {
        [opcode, echoed, payload @ ..]
            if *opcode == u8::from(Opcode::QueryInformation) && *echoed == expected_slot =>
        {
            let end = payload
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| Error::Protocol(format!("query_information({slot}): unterminated answer")))?;
            String::from_utf8(payload[..end].to_vec())
                .map_err(|_| Error::Protocol(format!("query_information({slot}): answer is not text")))
        }
        _ => Err(Error::Protocol(format!("query_information({slot}): wrong answer"))),
    }
}

/// Command channel over a transport, bound to one model's endpoints.
pub struct Channel<T> {
    transport: T,
    endpoints: EndpointConfig,
}

impl<T: Transport> Channel<T> {
    pub fn new(transport: T, endpoints: EndpointConfig) -> Self {
        Self { transport, endpoints }
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    pub fn default_timeout(&self) -> Duration {
        self.transport.default_timeout()
    }

    /// Send a command that has no response.
    pub fn send(&mut self, command: Command) -> Result<()> {
        debug!(?command, "Sending command");
        self.transport.write(self.endpoints.output, &command.to_bytes())
    }

    /// Send a command and read its response from the default input endpoint.
    fn query(&mut self, command: Command) -> Result<Bytes> {
        debug!(?command, "Querying");
        self.transport.query(
            self.endpoints.output,
            &command.to_bytes(),
            self.endpoints.input,
            self.endpoints.input_size,
        )
    }

    /// Read a QueryInformation slot as text.
    pub fn query_information(&mut self, slot: u8) -> Result<String> {
        let response = self.query_information_raw(slot)?;
        parse_information(slot, &response)
    }

    /// Read a QueryInformation slot without checking the echo.
    pub fn query_information_raw(&mut self, slot: u8) -> Result<Bytes> {
        self.query(Command::QueryInformation { slot })
    }

    pub fn query_status(&mut self) -> Result<DeviceStatus> {
        let response = self.query(Command::QueryStatus)?;
        DeviceStatus::parse(self.endpoints.input, &response)
    }

    /// Raw read, used for spectrum packets.
    pub fn read(&mut self, endpoint: u8, size: usize) -> Result<Bytes> {
        self.transport.read(endpoint, size)
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}
