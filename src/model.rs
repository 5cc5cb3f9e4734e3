//! Per-model configuration: endpoints, packet layouts and capabilities.
//!
//! The table is plain data. [`ModelTable::builtin`] parses the JSON embedded
//! from `src/models.json`; [`ModelTable::from_json_str`] and
//! [`ModelTable::from_path`] load replacements for hardware the built-in
//! table does not describe. A [`ModelConfig`] is handed to the driver by value
//! and never changes afterwards.

use crate::error::{Error, Result};
use crate::protocol::OCEAN_OPTICS_VID;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use strum_macros::Display;

const BUILTIN_MODELS: &str = include_str!("models.json");

/// Optional operations a model may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    #[strum(to_string = "Serial number readout")]
    SerialNumber,
    #[strum(to_string = "Shutdown mode")]
    ShutdownMode,
    #[strum(to_string = "Trigger mode")]
    TriggerMode,
}

/// Conversion from a raw little-endian `i16` sample to a detector count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleDecoding {
    /// The sample value as transmitted.
    #[default]
    #[strum(to_string = "signed")]
    Signed,
    /// 14-bit detectors send bit 13 inverted.
    #[strum(to_string = "flip_msb")]
    FlipMsb,
    /// 16-bit detectors; the sample is an unsigned count.
    #[strum(to_string = "unsigned")]
    Unsigned,
}

impl SampleDecoding {
    pub fn decode(self, raw: i16) -> f64 {
        match self {
            SampleDecoding::Signed => f64::from(raw),
            SampleDecoding::FlipMsb => f64::from(raw ^ 0x2000),
            SampleDecoding::Unsigned => f64::from(raw as u16),
        }
    }
}

/// How one spectrum is split into bulk packets at a given USB speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketLayout {
    pub packet_count: usize,
    pub packet_size: usize,
    #[serde(default)]
    pub decoding: SampleDecoding,
}

impl PacketLayout {
    /// Total payload bytes across all packets.
    pub fn spectrum_bytes(&self) -> Result<usize> {
        self.packet_count.checked_mul(self.packet_size).ok_or_else(|| {
            Error::Config(format!(
                "packet layout {} x {} bytes overflows",
                self.packet_count, self.packet_size
            ))
        })
    }

    /// Checks that the packets carry exactly two bytes per pixel.
    pub fn check(&self, pixel_count: usize) -> Result<()> {
        if Some(self.spectrum_bytes()?) != pixel_count.checked_mul(2) {
            return Err(Error::Config(format!(
                "packet layout {} x {} bytes does not hold {} pixels of 2 bytes",
                self.packet_count, self.packet_size, pixel_count
            )));
        }
        Ok(())
    }
}

/// Bulk endpoint addresses and read sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Commands go here.
    pub output: u8,
    /// Command responses, and spectra when the device is not high speed.
    pub input: u8,
    pub input_size: usize,
    /// Spectra when the device reports high speed.
    pub high_speed_input: u8,
    pub high_speed_input_size: usize,
}

fn default_vendor_id() -> u16 {
    OCEAN_OPTICS_VID
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Filled from the table key.
    #[serde(skip)]
    pub name: String,
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    pub product_ids: Vec<u16>,
    pub endpoints: EndpointConfig,
    /// Keyed by the `usb_speed` byte of the status record.
    pub layouts: BTreeMap<u8, PacketLayout>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl ModelConfig {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn layout(&self, usb_speed: u8) -> Result<PacketLayout> {
        self.layouts.get(&usb_speed).copied().ok_or_else(|| {
            Error::Config(format!(
                "{} has no packet layout for usb speed {:#04x}",
                self.name, usb_speed
            ))
        })
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_ids.contains(&product_id)
    }

    fn validate(&self) -> Result<()> {
        if self.product_ids.is_empty() {
            return Err(Error::Config(format!("{} lists no product ids", self.name)));
        }
        if self.layouts.is_empty() {
            return Err(Error::Config(format!("{} lists no packet layouts", self.name)));
        }
        if let Some((speed, _)) = self
            .layouts
            .iter()
            .find(|(_, layout)| layout.packet_count == 0 || layout.packet_size == 0)
        {
            return Err(Error::Config(format!(
                "{} has an empty packet layout for usb speed {:#04x}",
                self.name, speed
            )));
        }
        for layout in self.layouts.values() {
            layout.spectrum_bytes()?;
        }
        Ok(())
    }
}

/// Immutable model name → configuration map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelTable {
    models: BTreeMap<String, ModelConfig>,
}

impl ModelTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_MODELS)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut table: ModelTable = serde_json::from_str(json)?;
        for (name, model) in table.models.iter_mut() {
            model.name = name.clone();
            model.validate()?;
        }
        Ok(table)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read model table {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, name: &str) -> Result<&ModelConfig> {
        self.models
            .get(name)
            .ok_or_else(|| Error::Config(format!("Unknown Ocean Optics spectrometer model: {name}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_loads() {
        let table = ModelTable::builtin().expect("embedded table parses");
        let usb2000 = table.get("USB2000").unwrap();
        assert_eq!(usb2000.name, "USB2000");
        assert_eq!(usb2000.vendor_id, 0x2457);
        assert!(usb2000.matches(0x2457, 0x1002));
        assert_eq!(usb2000.layout(0x00).unwrap().spectrum_bytes().unwrap(), 2048 * 2);

        let plus = table.get("USB2000+").unwrap();
        assert_eq!(plus.layout(0x80).unwrap().decoding, SampleDecoding::FlipMsb);
        assert!(plus.supports(Capability::ShutdownMode));
        assert!(!usb2000.supports(Capability::ShutdownMode));
    }

    #[test]
    fn builtin_layouts_are_consistent_per_model() {
        let table = ModelTable::builtin().unwrap();
        for model in table.iter() {
            let sizes: Vec<usize> = model.layouts.values().map(|l| l.spectrum_bytes().unwrap()).collect();
            assert!(
                sizes.windows(2).all(|w| w[0] == w[1]),
                "{}: layouts disagree on spectrum size: {:?}",
                model.name,
                sizes
            );
        }
    }

    #[test]
    fn unknown_model_is_config_error() {
        let table = ModelTable::builtin().unwrap();
        assert!(matches!(table.get("USB9000"), Err(Error::Config(_))));
    }

    #[test]
    fn custom_table_from_json() {
        let json = r#"{
            "BENCH": {
                "product_ids": [4660],
                "endpoints": {
                    "output": 1, "input": 129, "input_size": 64,
                    "high_speed_input": 130, "high_speed_input_size": 512
                },
                "layouts": { "0": { "packet_count": 2, "packet_size": 4 } }
            }
        }"#;
        let table = ModelTable::from_json_str(json).unwrap();
        let bench = table.get("BENCH").unwrap();
        assert_eq!(bench.vendor_id, OCEAN_OPTICS_VID);
        assert_eq!(bench.layout(0).unwrap().decoding, SampleDecoding::Signed);
        assert!(bench.capabilities.is_empty());
        assert!(matches!(bench.layout(0x80), Err(Error::Config(_))));
    }

    #[test]
    fn empty_layouts_rejected() {
        let json = r#"{
            "BROKEN": {
                "product_ids": [1],
                "endpoints": {
                    "output": 1, "input": 129, "input_size": 64,
                    "high_speed_input": 130, "high_speed_input_size": 512
                },
                "layouts": { "0": { "packet_count": 0, "packet_size": 64 } }
            }
        }"#;
        assert!(matches!(ModelTable::from_json_str(json), Err(Error::Config(_))));
        assert!(matches!(ModelTable::from_json_str("{ nope"), Err(Error::Json(_))));
    }

    #[test]
    fn oversized_layout_rejected() {
        let json = r#"{
            "HUGE": {
                "product_ids": [1],
                "endpoints": {
                    "output": 1, "input": 129, "input_size": 64,
                    "high_speed_input": 130, "high_speed_input_size": 512
                },
                "layouts": { "0": { "packet_count": 4294967296, "packet_size": 4294967296 } }
            }
        }"#;
        assert!(matches!(ModelTable::from_json_str(json), Err(Error::Config(_))));

        let layout = PacketLayout {
            packet_count: usize::MAX,
            packet_size: 2,
            decoding: SampleDecoding::Signed,
        };
        assert!(matches!(layout.check(4), Err(Error::Config(_))));
        assert!(matches!(layout.check(usize::MAX), Err(Error::Config(_))));
    }

    #[test]
    fn layout_invariant() {
        let layout = PacketLayout {
            packet_count: 64,
            packet_size: 64,
            decoding: SampleDecoding::Signed,
        };
        assert!(layout.check(2048).is_ok());
        assert!(matches!(layout.check(2047), Err(Error::Config(_))));
    }

    #[test]
    fn sample_decodings() {
        assert_eq!(SampleDecoding::Signed.decode(-5), -5.0);
        assert_eq!(SampleDecoding::FlipMsb.decode(0x2064), 100.0);
        assert_eq!(SampleDecoding::FlipMsb.decode(0x0001), f64::from(0x2001));
        assert_eq!(SampleDecoding::Unsigned.decode(-1), 65535.0);
    }
}
