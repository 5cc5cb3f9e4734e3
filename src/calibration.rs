use crate::error::{Error, Result};
use crate::protocol::{Channel, NONLINEARITY_SLOTS, WAVELENGTH_SLOTS};
use crate::transport::Transport;

/// Calibration coefficients stored in the spectrometer's information slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Pixel index → wavelength (nm), ascending powers.
    pub wavelength: [f64; 4],
    /// Raw count → nonlinearity divisor, ascending powers.
    pub nonlinearity: [f64; 8],
}

impl Calibration {
    /// Read both coefficient sets from the device.
    pub fn read<T: Transport>(channel: &mut Channel<T>) -> Result<Self> {
        let mut wavelength = [0.0; 4];
        for (coeff, slot) in wavelength.iter_mut().zip(WAVELENGTH_SLOTS) {
            *coeff = read_coefficient(channel, slot)?;
        }
        let mut nonlinearity = [0.0; 8];
        for (coeff, slot) in nonlinearity.iter_mut().zip(NONLINEARITY_SLOTS) {
            *coeff = read_coefficient(channel, slot)?;
        }
        Ok(Self {
            wavelength,
            nonlinearity,
        })
    }

    /// `axis[p] = Σ wavelength[i] · p^i`
    pub fn wavelength_axis(&self, pixel_count: usize) -> Vec<f64> {
        (0..pixel_count)
            .map(|p| polynomial(&self.wavelength, p as f64))
            .collect()
    }

    /// `corrected[p] = raw[p] / Σ nonlinearity[i] · raw[p]^i`
    pub fn linearize(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter()
            .map(|&counts| counts / polynomial(&self.nonlinearity, counts))
            .collect()
    }
}

/// Evaluate `Σ coeffs[i] · x^i` (Horner).
pub fn polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

fn read_coefficient<T: Transport>(channel: &mut Channel<T>, slot: u8) -> Result<f64> {
    let text = channel.query_information(slot)?;
    text.trim()
        .parse()
        .map_err(|_| Error::Protocol(format!("information slot {slot} is not a number: {text:?}")))
}
