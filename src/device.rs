// src/device.rs

use crate::calibration::Calibration;
use crate::error::{Error, Result};
use crate::init::InitSequencer;
use crate::model::{Capability, ModelConfig, ModelTable};
use crate::protocol::{Channel, Command, SERIAL_NUMBER_SLOT, TriggerMode};
use crate::spectrum::SpectrumReader;
use crate::status::DeviceStatus;
use crate::transport::Transport;
use crate::usb::{UsbOptions, UsbTransport};
use std::time::Duration;
use tracing::info;

/// Represents an initialized connection to an Ocean Optics spectrometer.
///
/// All operations block. The device answers one command at a time, so every
/// method takes `&mut self`; wrap the driver in a `Mutex` to share it.
pub struct Spectrometer<T: Transport> {
    channel: Channel<T>,
    model: ModelConfig,
    reader: SpectrumReader,
    calibration: Calibration,
    wavelengths: Vec<f64>,
}

impl Spectrometer<UsbTransport> {
    /// Connect to a spectrometer of model `model_name` over USB and initialize it.
    pub fn open(model_name: &str, models: &ModelTable, options: &UsbOptions) -> Result<Self> {
        let model = models.get(model_name)?.clone();
        let transport = UsbTransport::connect(&model, options)?;
        Self::new(model, transport)
    }
}

impl<T: Transport> Spectrometer<T> {
    /// Initialize a spectrometer reachable through `transport`.
    pub fn new(model: ModelConfig, transport: T) -> Result<Self> {
        let mut channel = Channel::new(transport, model.endpoints);
        let session = InitSequencer::new(&model, &mut channel).run()?;
        info!(
            model = %model.name,
            pixels = session.reader.pixel_count(),
            "Spectrometer initialized and ready."
        );
        Ok(Self {
            channel,
            model,
            reader: session.reader,
            calibration: session.calibration,
            wavelengths: session.wavelengths,
        })
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn pixel_count(&self) -> usize {
        self.reader.pixel_count()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Wavelength (nm) of every pixel.
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Acquire a spectrum with nonlinearity correction applied.
    pub fn spectrum(&mut self) -> Result<Vec<f64>> {
        let raw = self.raw_spectrum()?;
        Ok(self.calibration.linearize(&raw))
    }

    /// Acquire a spectrum of decoded counts without correction.
    pub fn raw_spectrum(&mut self) -> Result<Vec<f64>> {
        self.reader.acquire(&mut self.channel)
    }

    /// Fresh status snapshot.
    pub fn status(&mut self) -> Result<DeviceStatus> {
        self.channel.query_status()
    }

    /// Integration time as currently reported by the device.
    pub fn integration_time(&mut self) -> Result<Duration> {
        let integration_time = self.channel.query_status()?.integration_time();
        self.reader.set_integration_time(integration_time);
        Ok(integration_time)
    }

    /// Program a new integration time and return what the device reports afterwards.
    pub fn set_integration_time(&mut self, micros: u32) -> Result<Duration> {
        self.channel.send(Command::SetIntegrationTime { micros })?;
        self.integration_time()
    }

    pub fn serial_number(&mut self) -> Result<String> {
        self.require(Capability::SerialNumber)?;
        self.channel.query_information(SERIAL_NUMBER_SLOT)
    }

    /// `false` powers down the detector electronics; `true` restores them.
    pub fn set_shutdown_mode(&mut self, powered: bool) -> Result<()> {
        self.require(Capability::ShutdownMode)?;
        self.channel.send(Command::SetShutdownMode { powered })
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        self.require(Capability::TriggerMode)?;
        self.channel.send(Command::SetTriggerMode(mode))
    }

    /// Release the transport.
    pub fn into_transport(self) -> T {
        self.channel.into_inner()
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.model.supports(capability) {
            Ok(())
        } else {
            Err(Error::Unsupported {
                model: self.model.name.clone(),
                capability,
            })
        }
    }
}
