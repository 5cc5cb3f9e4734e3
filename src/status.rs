use crate::error::{Error, Result};
use num_enum::FromPrimitive;
use std::time::Duration;
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of the status record returned for `QueryStatus` (16 bytes)
pub const STATUS_SIZE: usize = 16;

/// Wire layout of the status record, all fields little-endian.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DeviceStatusRaw {
    pub pixel_count: U16,
    pub integration_time_us: U32,
    pub lamp_enable: u8,
    pub trigger_mode: u8,
    pub acquisition_status: u8,
    pub packets_in_spectrum: u8,
    pub power_down: u8,
    pub packets_in_endpoint: u8,
    pub reserved: [u8; 2],
    pub usb_speed: u8,
    pub reserved_tail: u8,
}

/// Bus speed as reported in the status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromPrimitive)]
#[repr(u8)]
pub enum UsbSpeed {
    #[strum(to_string = "full speed")]
    Full = 0x00,
    #[strum(to_string = "high speed")]
    High = 0x80,
    #[num_enum(catch_all)]
    #[strum(to_string = "unknown speed")]
    Unknown(u8),
}

/// Snapshot of the device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub pixel_count: u16,
    pub integration_time_us: u32,
    pub lamp_enable: u8,
    pub trigger_mode: u8,
    pub acquisition_status: u8,
    pub packets_in_spectrum: u8,
    pub power_down: u8,
    pub packets_in_endpoint: u8,
    pub usb_speed: u8,
}

impl DeviceStatus {
    /// Decode the first [`STATUS_SIZE`] bytes of a status response read from `endpoint`.
    pub fn parse(endpoint: u8, bytes: &[u8]) -> Result<Self> {
        let (raw, _) = DeviceStatusRaw::read_from_prefix(bytes).map_err(|_| Error::ShortRead {
            endpoint,
            expected: STATUS_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self::from(raw))
    }

    pub fn integration_time(&self) -> Duration {
        Duration::from_micros(u64::from(self.integration_time_us))
    }

    pub fn speed(&self) -> UsbSpeed {
        UsbSpeed::from_primitive(self.usb_speed)
    }

    pub fn is_high_speed(&self) -> bool {
        self.speed() == UsbSpeed::High
    }
}

impl From<DeviceStatusRaw> for DeviceStatus {
    fn from(raw: DeviceStatusRaw) -> Self {
        Self {
            pixel_count: raw.pixel_count.get(),
            integration_time_us: raw.integration_time_us.get(),
            lamp_enable: raw.lamp_enable,
            trigger_mode: raw.trigger_mode,
            acquisition_status: raw.acquisition_status,
            packets_in_spectrum: raw.packets_in_spectrum,
            power_down: raw.power_down,
            packets_in_endpoint: raw.packets_in_endpoint,
            usb_speed: raw.usb_speed,
        }
    }
}
