// src/usb.rs

use crate::error::{Error, Result};
use crate::model::ModelConfig;
use crate::transport::Transport;
use bytes::Bytes;
use nusb::{DeviceInfo, Interface, transfer::RequestBuffer};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Default timeout for USB operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Which device to use when several match the model's vendor/product ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// Use the first match, warning if there are more.
    #[default]
    First,
    /// Fail unless exactly one device matches.
    Unique,
    /// Use the device with this serial-number string descriptor.
    Serial(String),
}

impl DeviceSelection {
    /// Pick one of `candidates`. `serial` extracts a candidate's serial number.
    pub fn pick<D>(
        &self,
        model: &str,
        vendor_id: u16,
        candidates: Vec<D>,
        serial: impl Fn(&D) -> Option<&str>,
    ) -> Result<D> {
        let count = candidates.len();
        let not_found = || Error::DeviceNotFound {
            model: model.to_string(),
            vendor_id,
        };
        match self {
            DeviceSelection::First => {
                if count > 1 {
                    warn!(model, count, "Several devices match, using the first one");
                }
                candidates.into_iter().next().ok_or_else(not_found)
            }
            DeviceSelection::Unique if count > 1 => Err(Error::AmbiguousDevice {
                model: model.to_string(),
                count,
            }),
            DeviceSelection::Unique => candidates.into_iter().next().ok_or_else(not_found),
            DeviceSelection::Serial(wanted) => candidates
                .into_iter()
                .find(|d| serial(d) == Some(wanted.as_str()))
                .ok_or_else(not_found),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbOptions {
    pub timeout: Duration,
    pub configuration: u8,
    pub interface: u8,
    pub selection: DeviceSelection,
}

impl Default for UsbOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            configuration: 1,
            interface: 0,
            selection: DeviceSelection::default(),
        }
    }
}

/// Blocking bulk transport over `nusb`.
///
/// Transfers are futures; each call drives one to completion on a private
/// current-thread runtime under `tokio::time::timeout`.
pub struct UsbTransport {
    interface: Interface,
    runtime: Runtime,
    timeout: Duration,
}

impl UsbTransport {
    /// Find, open and configure a spectrometer of the given model.
    pub fn connect(model: &ModelConfig, options: &UsbOptions) -> Result<Self> {
        info!("Searching for Ocean Optics {}...", model.name);
        let candidates: Vec<DeviceInfo> = nusb::list_devices()?
            .filter(|d| model.matches(d.vendor_id(), d.product_id()))
            .collect();

        let device_info = options
            .selection
            .pick(&model.name, model.vendor_id, candidates, |d| d.serial_number())?;

        info!(
            "Found device on bus {} addr {}",
            device_info.bus_number(),
            device_info.device_address()
        );

        let device = device_info.open()?;
        device.set_configuration(options.configuration)?;
        let interface = device.detach_and_claim_interface(options.interface)?;
        info!("Interface claimed successfully.");

        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;

        Ok(Self {
            interface,
            runtime,
            timeout: options.timeout,
        })
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<()> {
        debug!(endpoint, bytes = %hex::encode(data), "USB Write");
        let transfer = self.interface.bulk_out(endpoint, data.to_vec());
        let timeout = self.timeout;
        let completion = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, transfer).await })
            .map_err(|_| Error::Timeout {
                endpoint,
                after: timeout,
            })?;
        completion.into_result()?;
        Ok(())
    }

    fn read(&mut self, endpoint: u8, size: usize) -> Result<Bytes> {
        let transfer = self.interface.bulk_in(endpoint, RequestBuffer::new(size));
        let timeout = self.timeout;
        let completion = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, transfer).await })
            .map_err(|_| Error::Timeout {
                endpoint,
                after: timeout,
            })?;
        let data = completion.into_result()?;
        debug!(endpoint, bytes = %hex::encode(&data), "USB Read");
        Ok(Bytes::from(data))
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }
}
