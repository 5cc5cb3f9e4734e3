//! Device bring-up as an explicit state machine.
//!
//! ```text
//! Disconnected → Connected → StatusKnown → EndpointSelected → SpectrumWarm → Calibrated → Ready
//! ```
//!
//! [`InitSequencer::run`] walks every transition. The individual steps are
//! public so a partially initialized device can be inspected.

use crate::calibration::Calibration;
use crate::error::{Error, Result};
use crate::model::ModelConfig;
use crate::protocol::{Channel, Command, HIGH_SPEED};
use crate::retry::{RetryError, RetryPolicy};
use crate::spectrum::SpectrumReader;
use crate::status::DeviceStatus;
use crate::transport::Transport;
use strum_macros::Display;
use tracing::info;

/// Integration time programmed before the warm-up acquisition.
pub const WARM_UP_INTEGRATION_US: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum InitState {
    Disconnected,
    Connected,
    StatusKnown,
    EndpointSelected,
    SpectrumWarm,
    Calibrated,
    Ready,
}

/// Everything the driver keeps after a successful bring-up.
#[derive(Debug, Clone)]
pub struct Session {
    pub status: DeviceStatus,
    pub reader: SpectrumReader,
    pub calibration: Calibration,
    pub wavelengths: Vec<f64>,
}

pub struct InitSequencer<'a, T> {
    channel: &'a mut Channel<T>,
    model: &'a ModelConfig,
    policy: RetryPolicy,
    state: InitState,
}

impl<'a, T: Transport> InitSequencer<'a, T> {
    /// Starts in [`InitState::Connected`]: the channel already owns an open transport.
    pub fn new(model: &'a ModelConfig, channel: &'a mut Channel<T>) -> Self {
        Self {
            channel,
            model,
            policy: RetryPolicy::default(),
            state: InitState::Connected,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    fn advance(&mut self, state: InitState) {
        info!(model = %self.model.name, %state, "Initialization step complete");
        self.state = state;
    }

    /// Send Initialize, then poll status until the device answers.
    pub fn establish_status(&mut self) -> Result<DeviceStatus> {
        self.channel.send(Command::Initialize)?;
        let channel = &mut *self.channel;
        let status = retrying(self.policy, "USBCOM", || channel.query_status())?;
        info!(
            pixels = status.pixel_count,
            integration_us = status.integration_time_us,
            speed = %status.speed(),
            "Status received"
        );
        self.advance(InitState::StatusKnown);
        Ok(status)
    }

    /// Pick the spectral endpoint and packet layout for the reported speed.
    pub fn select_endpoint(&mut self, status: &DeviceStatus) -> Result<SpectrumReader> {
        let endpoints = self.channel.endpoints();
        let endpoint = if status.usb_speed == HIGH_SPEED {
            endpoints.high_speed_input
        } else {
            endpoints.input
        };
        let layout = self.model.layout(status.usb_speed)?;
        let reader = SpectrumReader::new(
            endpoint,
            layout,
            usize::from(status.pixel_count),
            status.integration_time(),
        )?;
        info!(
            endpoint = %format!("{endpoint:#04x}"),
            packets = layout.packet_count,
            packet_size = layout.packet_size,
            "Spectral endpoint selected"
        );
        self.advance(InitState::EndpointSelected);
        Ok(reader)
    }

    /// Program a short integration time and take one throwaway spectrum.
    pub fn warm_up(&mut self, reader: &mut SpectrumReader) -> Result<()> {
        self.channel.send(Command::SetIntegrationTime {
            micros: WARM_UP_INTEGRATION_US,
        })?;
        let status = self.channel.query_status()?;
        reader.set_integration_time(status.integration_time());

        let channel = &mut *self.channel;
        let mut first = true;
        retrying(self.policy, "SPECTRUM", || {
            // A failed attempt may still have packets in flight.
            if !std::mem::take(&mut first) {
                reader.drain(channel)?;
            }
            reader.acquire(channel)
        })?;
        self.advance(InitState::SpectrumWarm);
        Ok(())
    }

    pub fn calibrate(&mut self, pixel_count: usize) -> Result<(Calibration, Vec<f64>)> {
        let calibration = Calibration::read(self.channel)?;
        let wavelengths = calibration.wavelength_axis(pixel_count);
        self.advance(InitState::Calibrated);
        Ok((calibration, wavelengths))
    }

    /// Run every step in order.
    pub fn run(mut self) -> Result<Session> {
        let status = self.establish_status()?;
        let mut reader = self.select_endpoint(&status)?;
        self.warm_up(&mut reader)?;
        let (calibration, wavelengths) = self.calibrate(reader.pixel_count())?;
        self.advance(InitState::Ready);
        Ok(Session {
            status,
            reader,
            calibration,
            wavelengths,
        })
    }
}

/// Retry transport-class failures, then report exhaustion as an initialization error.
fn retrying<T>(policy: RetryPolicy, stage: &'static str, op: impl FnMut() -> Result<T>) -> Result<T> {
    policy.run(op, Error::is_transport).map_err(|e| match e {
        RetryError::Fatal(e) => e,
        RetryError::Exhausted { attempts, last } => Error::Initialization {
            stage,
            attempts,
            last: Box::new(last),
        },
    })
}
