//! Raw endpoint I/O underneath the command protocol.
//!
//! A [`Transport`] moves opaque bytes to and from numbered bulk endpoints and
//! knows nothing about commands. [`crate::usb::UsbTransport`] is the
//! production implementation; tests substitute a simulated device.

use crate::error::Result;
use bytes::Bytes;
use std::time::Duration;

/// Blocking endpoint I/O with a bounded timeout.
///
/// Implementations assume strict request-then-response ordering: a driver
/// never has two transfers in flight on the same transport.
pub trait Transport {
    /// Write `data` to the OUT endpoint `endpoint`.
    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<()>;

    /// Read at most `size` bytes from the IN endpoint `endpoint`.
    ///
    /// Returns what the device actually sent, which may be shorter than
    /// `size`. Callers needing an exact length check it themselves.
    fn read(&mut self, endpoint: u8, size: usize) -> Result<Bytes>;

    /// Write then read. No retry.
    fn query(&mut self, out_endpoint: u8, data: &[u8], in_endpoint: u8, size: usize) -> Result<Bytes> {
        self.write(out_endpoint, data)?;
        self.read(in_endpoint, size)
    }

    /// Timeout applied to every transfer, fixed at connection time.
    fn default_timeout(&self) -> Duration;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<()> {
        (**self).write(endpoint, data)
    }

    fn read(&mut self, endpoint: u8, size: usize) -> Result<Bytes> {
        (**self).read(endpoint, size)
    }

    fn default_timeout(&self) -> Duration {
        (**self).default_timeout()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<()> {
        (**self).write(endpoint, data)
    }

    fn read(&mut self, endpoint: u8, size: usize) -> Result<Bytes> {
        (**self).read(endpoint, size)
    }

    fn default_timeout(&self) -> Duration {
        (**self).default_timeout()
    }
}
