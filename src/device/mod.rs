//! Devices: registry, connection, flashing tool and the flash sequence

pub mod flasher;
pub mod link;
pub mod location;
pub mod registry;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

pub use flasher::{FlashState, Flasher, PARTITIONS};
pub use link::{DeviceLink, HdcLink};
pub use location::LocationCache;
pub use registry::DeviceRegistry;
pub use tool::{FlashTool, ProcessFlashTool};
