pub mod calibration;
pub mod device;
pub mod error;
pub mod init;
pub mod model;
pub mod protocol;
pub mod retry;
pub mod spectrum;
pub mod status;
pub mod transport;
pub mod usb;

// Re-export the main types for easy access
pub use device::Spectrometer;
pub use error::{Error, Result};
pub use model::{Capability, ModelConfig, ModelTable};
pub use protocol::TriggerMode;
pub use status::DeviceStatus;
pub use transport::Transport;
pub use usb::{DeviceSelection, UsbOptions, UsbTransport};
