//! sbig-util: session management and driver access for SBIG cameras
//!
//! The crate has two halves. The [`session`] side models the parallel-port
//! kernel driver: per-open sessions, exclusive I/O-port claims through a
//! [`PortRegistrar`], and the port-rebinding ioctl. The [`device`] side wraps
//! the vendor's universal driver library behind a [`Handle`], with typed
//! camera queries in [`camera`].

pub mod bcd;
pub mod camera;
pub mod config;
pub mod device;
pub mod ffi;
pub mod ioctl;
pub mod region;
pub mod session;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use camera::{CcdChip, DeviceSpec, FieldOfView};
pub use config::{Config, ConfigError};
pub use device::{load_driver, DriverLibrary, Handle};
pub use ioctl::LinuxLptPortParams;
pub use region::IoRegionTable;
pub use session::{Session, SessionRegistry, SessionSnapshot};
pub use traits::{
    DriverError, HandleId, LoadError, OpenMode, PortRange, PortRegistrar, RegionError,
    SessionError, UniversalDriver,
};
