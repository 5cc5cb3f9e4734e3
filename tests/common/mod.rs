//! Common test utilities: a simulated spectrometer behind the `Transport` trait.

// Not every test file uses every helper.
#![allow(dead_code)]

use bytes::Bytes;
use oceanoptics_rs::model::{EndpointConfig, ModelConfig, PacketLayout, SampleDecoding};
use oceanoptics_rs::protocol::HIGH_SPEED;
use oceanoptics_rs::status::DeviceStatusRaw;
use oceanoptics_rs::{Capability, Error, ModelTable, Result, Transport};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use zerocopy::IntoBytes;
use zerocopy::byteorder::little_endian::{U16, U32};

pub const OUT: u8 = 0x01;
pub const CONTROL_IN: u8 = 0x81;
pub const SPECTRAL_IN: u8 = 0x82;

/// Route `RUST_LOG` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn builtin(name: &str) -> ModelConfig {
    ModelTable::builtin()
        .expect("built-in table parses")
        .get(name)
        .expect("model exists")
        .clone()
}

/// A four-pixel model split into two 4-byte packets at full speed and one
/// 8-byte packet at high speed.
pub fn bench_model() -> ModelConfig {
    let mut layouts = BTreeMap::new();
    layouts.insert(
        0x00,
        PacketLayout {
            packet_count: 2,
            packet_size: 4,
            decoding: SampleDecoding::Signed,
        },
    );
    layouts.insert(
        HIGH_SPEED,
        PacketLayout {
            packet_count: 1,
            packet_size: 8,
            decoding: SampleDecoding::FlipMsb,
        },
    );
    ModelConfig {
        name: "BENCH".to_string(),
        vendor_id: 0x2457,
        product_ids: vec![0x1234],
        endpoints: EndpointConfig {
            output: OUT,
            input: CONTROL_IN,
            input_size: 64,
            high_speed_input: SPECTRAL_IN,
            high_speed_input_size: 512,
        },
        layouts,
        capabilities: vec![Capability::SerialNumber],
    }
}

/// Device-side behaviour of the legacy command set.
///
/// Writes are interpreted as commands and queue the matching responses on
/// the input endpoints; reading an empty endpoint times out.
pub struct SimulatedSpectrometer {
    pub endpoints: EndpointConfig,
    pub pixel_count: u16,
    pub integration_time_us: u32,
    /// Requests above this are clamped, as real detectors do.
    pub max_integration_time_us: u32,
    pub usb_speed: u8,
    pub information: HashMap<u8, String>,
    pub samples: Vec<i16>,
    pub packet_size: usize,
    pub sync_byte: u8,
    /// Status queries that go unanswered before the device responds.
    pub status_failures: usize,
    /// Spectrum requests that go unanswered before the device responds.
    pub spectrum_failures: usize,
    /// The next spectrum sends only its first packet in time; the rest
    /// arrives just after the host's read times out.
    pub late_spectrum_tail: bool,
    pub timeout: Duration,
    pub written: Vec<(u8, Vec<u8>)>,
    pub status_queries: usize,
    pending: HashMap<u8, VecDeque<Bytes>>,
    in_flight: Vec<(u8, Bytes)>,
}

impl SimulatedSpectrometer {
    pub fn new(model: &ModelConfig, pixel_count: u16, usb_speed: u8) -> Self {
        let packet_size = model
            .layouts
            .get(&usb_speed)
            .map(|l| l.packet_size)
            .unwrap_or(64);
        Self {
            endpoints: model.endpoints,
            pixel_count,
            integration_time_us: 100_000,
            max_integration_time_us: u32::MAX,
            usb_speed,
            information: HashMap::new(),
            samples: vec![0; usize::from(pixel_count)],
            packet_size,
            sync_byte: 0x69,
            status_failures: 0,
            spectrum_failures: 0,
            late_spectrum_tail: false,
            timeout: Duration::from_secs(1),
            written: Vec::new(),
            status_queries: 0,
            pending: HashMap::new(),
            in_flight: Vec::new(),
        }
        .with_calibration(&[400.0, 0.5, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    pub fn with_calibration(mut self, wavelength: &[f64; 4], nonlinearity: &[f64; 8]) -> Self {
        for (slot, value) in (1u8..=4).zip(wavelength) {
            self.information.insert(slot, format!("{value:e}"));
        }
        for (slot, value) in (6u8..=13).zip(nonlinearity) {
            self.information.insert(slot, format!("{value:e}"));
        }
        self
    }

    /// Opcodes of every command written, in order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.written.iter().map(|(_, bytes)| bytes[0]).collect()
    }

    fn spectral_endpoint(&self) -> u8 {
        if self.usb_speed == HIGH_SPEED {
            self.endpoints.high_speed_input
        } else {
            self.endpoints.input
        }
    }

    fn queue(&mut self, endpoint: u8, data: Vec<u8>) {
        self.pending.entry(endpoint).or_default().push_back(Bytes::from(data));
    }

    fn status_bytes(&self) -> Vec<u8> {
        DeviceStatusRaw {
            pixel_count: U16::new(self.pixel_count),
            integration_time_us: U32::new(self.integration_time_us),
            lamp_enable: 0,
            trigger_mode: 0,
            acquisition_status: 0,
            packets_in_spectrum: 0,
            power_down: 0,
            packets_in_endpoint: 0,
            reserved: [0; 2],
            usb_speed: self.usb_speed,
            reserved_tail: 0,
        }
        .as_bytes()
        .to_vec()
    }

    fn handle(&mut self, command: &[u8]) {
        match command {
            [0x01] => {}
            [0x02, a, b, c, d] => {
                self.integration_time_us = u32::from_le_bytes([*a, *b, *c, *d]).min(self.max_integration_time_us);
            }
            [0x04, ..] | [0x0a, ..] => {}
            [0x05, slot] => {
                let mut response = vec![0x05, *slot % 0xff];
                if let Some(text) = self.information.get(slot) {
                    response.extend_from_slice(text.as_bytes());
                }
                response.extend_from_slice(&[0; 8]);
                self.queue(self.endpoints.input, response);
            }
            [0x09] => {
                if self.spectrum_failures > 0 {
                    self.spectrum_failures -= 1;
                    return;
                }
                let endpoint = self.spectral_endpoint();
                let data: Vec<u8> = self.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                let mut packets: Vec<Vec<u8>> = data.chunks(self.packet_size).map(<[u8]>::to_vec).collect();
                packets.push(vec![self.sync_byte]);
                let on_time = if std::mem::take(&mut self.late_spectrum_tail) { 1 } else { packets.len() };
                for (i, packet) in packets.into_iter().enumerate() {
                    if i < on_time {
                        self.queue(endpoint, packet);
                    } else {
                        self.in_flight.push((endpoint, Bytes::from(packet)));
                    }
                }
            }
            [0xfe] => {
                self.status_queries += 1;
                if self.status_failures > 0 {
                    self.status_failures -= 1;
                    return;
                }
                let status = self.status_bytes();
                self.queue(self.endpoints.input, status);
            }
            other => panic!("unexpected command {other:02x?}"),
        }
    }
}

impl Transport for SimulatedSpectrometer {
    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<()> {
        assert_eq!(endpoint, self.endpoints.output, "command sent to wrong endpoint");
        self.written.push((endpoint, data.to_vec()));
        self.handle(data);
        Ok(())
    }

    fn read(&mut self, endpoint: u8, size: usize) -> Result<Bytes> {
        let next = self.pending.get_mut(&endpoint).and_then(VecDeque::pop_front);
        match next {
            Some(mut data) => {
                data.truncate(size);
                Ok(data)
            }
            None => {
                // Late data lands once the host has given up waiting.
                for (late_endpoint, data) in std::mem::take(&mut self.in_flight) {
                    self.pending.entry(late_endpoint).or_default().push_back(data);
                }
                Err(Error::Timeout {
                    endpoint,
                    after: self.timeout,
                })
            }
        }
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }
}
