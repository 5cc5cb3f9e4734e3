//! Spectrum acquisition: request, wait, reassemble packets, decode samples.

use crate::error::{Error, Result};
use crate::model::{PacketLayout, SampleDecoding};
use crate::protocol::{Channel, Command, SYNC_BYTE};
use crate::transport::Transport;
use bytes::BytesMut;
use std::time::Duration;
use tracing::debug;
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::I16;

/// Acquisition parameters fixed at initialization, plus the integration time
/// last reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumReader {
    endpoint: u8,
    layout: PacketLayout,
    pixel_count: usize,
    integration_time: Duration,
}

impl SpectrumReader {
    /// Fails with a configuration error unless `layout` carries exactly
    /// `pixel_count` two-byte samples.
    pub fn new(endpoint: u8, layout: PacketLayout, pixel_count: usize, integration_time: Duration) -> Result<Self> {
        layout.check(pixel_count)?;
        Ok(Self {
            endpoint,
            layout,
            pixel_count,
            integration_time,
        })
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    pub fn integration_time(&self) -> Duration {
        self.integration_time
    }

    pub fn set_integration_time(&mut self, integration_time: Duration) {
        self.integration_time = integration_time;
    }

    /// Sleep before the first read; the transfer timeout covers the rest.
    pub fn acquisition_wait(&self, timeout: Duration) -> Duration {
        self.integration_time.saturating_sub(timeout)
    }

    /// Discard whatever a previous, abandoned acquisition left queued on the
    /// spectral endpoint. Stops at the first timeout or empty read, and after
    /// at most one spectrum's worth of reads. Returns the bytes discarded.
    pub fn drain<T: Transport>(&self, channel: &mut Channel<T>) -> Result<usize> {
        let mut discarded = 0;
        for _ in 0..=self.layout.packet_count {
            match channel.read(self.endpoint, self.layout.packet_size) {
                Ok(stale) if stale.is_empty() => break,
                Ok(stale) => discarded += stale.len(),
                Err(Error::Timeout { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        if discarded > 0 {
            debug!(endpoint = self.endpoint, discarded, "Drained stale spectrum data");
        }
        Ok(discarded)
    }

    /// Acquire one spectrum and return the decoded, uncorrected counts.
    pub fn acquire<T: Transport>(&self, channel: &mut Channel<T>) -> Result<Vec<f64>> {
        channel.send(Command::RequestSpectrum)?;

        let wait = self.acquisition_wait(channel.default_timeout());
        if !wait.is_zero() {
            debug!(?wait, "Waiting for acquisition");
            std::thread::sleep(wait);
        }

        let mut data = BytesMut::with_capacity(self.pixel_count * 2);
        for _ in 0..self.layout.packet_count {
            let packet = channel.read(self.endpoint, self.layout.packet_size)?;
            if packet.len() != self.layout.packet_size {
                return Err(Error::ShortRead {
                    endpoint: self.endpoint,
                    expected: self.layout.packet_size,
                    actual: packet.len(),
                });
            }
            data.extend_from_slice(&packet);
        }

        let sync = channel.read(self.endpoint, 1)?;
        match sync.first() {
            Some(&SYNC_BYTE) => {}
            Some(&other) => return Err(Error::SpectrumSync(other)),
            None => {
                return Err(Error::ShortRead {
                    endpoint: self.endpoint,
                    expected: 1,
                    actual: 0,
                });
            }
        }

        debug!(packets = self.layout.packet_count, bytes = data.len(), "Spectrum received");
        decode_samples(&data, self.pixel_count, self.layout.decoding)
    }
}

/// Interpret `data` as `pixel_count` little-endian `i16` samples and decode each.
pub fn decode_samples(data: &[u8], pixel_count: usize, decoding: SampleDecoding) -> Result<Vec<f64>> {
    let samples = <[I16]>::ref_from_bytes(data)
        .map_err(|_| Error::Protocol(format!("spectrum of {} bytes is not whole samples", data.len())))?;
    if samples.len() != pixel_count {
        return Err(Error::Protocol(format!(
            "spectrum holds {} samples, expected {}",
            samples.len(),
            pixel_count
        )));
    }
    Ok(samples.iter().map(|s| decoding.decode(s.get())).collect())
}
