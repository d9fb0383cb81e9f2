//! Core traits and types for the session and driver abstractions.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Number of addressable x86 I/O ports.
pub const IO_SPACE_SIZE: u32 = 0x1_0000;

/// A contiguous block of I/O ports, `[base, base + span)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRange {
    /// First port of the range.
    pub base: u16,
    /// Number of ports in the range.
    pub span: u16,
}

impl PortRange {
    /// Create a new port range.
    #[must_use]
    pub const fn new(base: u16, span: u16) -> Self {
        Self { base, span }
    }

    /// One past the last port, widened so that ranges ending at the top of
    /// the port space stay representable.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.base as u32 + self.span as u32
    }

    /// Whether the range is non-empty and fits inside the I/O space.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.span > 0 && self.end() <= IO_SPACE_SIZE
    }

    /// Whether `port` falls inside this range.
    #[must_use]
    pub const fn contains(&self, port: u16) -> bool {
        port >= self.base && (port as u32) < self.end()
    }

    /// Whether the two ranges share at least one port.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        (self.base as u32) < other.end() && (other.base as u32) < self.end()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.end().saturating_sub(1);
        write!(f, "{:#06x}-{last:#06x}", self.base)
    }
}

/// How the device handle was opened, as reported by the diagnostic dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    /// Handle was opened for reading.
    pub read: bool,
    /// Handle was opened for writing.
    pub write: bool,
}

impl OpenMode {
    /// Opened for reading only.
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    /// Opened for writing only.
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    /// Opened for reading and writing.
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };

    /// Human readable description, `None` when neither flag is set.
    #[must_use]
    pub const fn describe(self) -> Option<&'static str> {
        match (self.read, self.write) {
            (true, true) => Some("device opened for reading and writing"),
            (true, false) => Some("device opened for reading"),
            (false, true) => Some("device opened for writing"),
            (false, false) => None,
        }
    }
}

/// Opaque identifier of an open device handle.
///
/// The registry keys sessions by this value; callers never see a reference
/// into the session itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Refusal reported by a [`PortRegistrar`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// Some port of the range is already claimed.
    #[error("I/O region {range} overlaps {held} held by {owner}")]
    Busy {
        /// Range that was requested.
        range: PortRange,
        /// Conflicting range already in the table.
        held: PortRange,
        /// Label of the conflicting claim.
        owner: String,
    },
    /// The range is empty or runs past the end of the I/O space.
    #[error("I/O region {0} is empty or outside the I/O space")]
    Invalid(PortRange),
    /// Release of a range that was never claimed.
    #[error("I/O region {0} is not reserved")]
    NotReserved(PortRange),
}

/// Error type for device session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The handle already carries a session.
    #[error("device already open on {0}")]
    AlreadyOpen(HandleId),
    /// No session is associated with the handle.
    #[error("no session open on {0}")]
    NotOpen(HandleId),
    /// Allocation of the session or its I/O buffer failed.
    #[error("out of memory allocating {what} ({size} bytes)")]
    OutOfMemory {
        /// Which allocation failed.
        what: &'static str,
        /// Requested size in bytes.
        size: usize,
    },
    /// The registrar refused the port reservation.
    #[error(
        "port_base {:#X}, port_span {}: {source}; LPT port probably allocated by your printer, \
         unload it and try again (modprobe -r lp, modprobe -r parport_pc, modprobe -r parport)",
        .range.base,
        .range.span
    )]
    PortBusy {
        /// Range that could not be reserved.
        range: PortRange,
        /// Registrar diagnostic.
        source: RegionError,
    },
    /// Release of a reservation the session does not hold.
    #[error("session does not hold I/O region {0}")]
    NotReserved(PortRange),
    /// Parameters could not be copied from caller memory.
    #[error("copy of ioctl parameters failed: expected {expected} bytes, got {actual}")]
    CopyFault {
        /// Size of the parameter block.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Registrar of exclusive I/O-port reservations.
///
/// Implementations provide their own internal locking; a request either
/// succeeds immediately or fails immediately.
pub trait PortRegistrar {
    /// Reserve `range` exclusively under `label`.
    fn request(&self, range: PortRange, label: &str) -> std::result::Result<(), RegionError>;

    /// Release a reservation previously granted for exactly `range`.
    fn release(&self, range: PortRange) -> std::result::Result<(), RegionError>;
}

impl<T: PortRegistrar + ?Sized> PortRegistrar for Arc<T> {
    fn request(&self, range: PortRange, label: &str) -> std::result::Result<(), RegionError> {
        (**self).request(range, label)
    }

    fn release(&self, range: PortRange) -> std::result::Result<(), RegionError> {
        (**self).release(range)
    }
}

/// Failure to load the vendor library or resolve its entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct LoadError {
    /// Library that was being loaded.
    pub path: String,
    /// Loader diagnostic text.
    pub message: String,
}

/// Error type for vendor driver calls.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Loading the library failed.
    #[error("failed to load driver: {0}")]
    Load(#[from] LoadError),
    /// A command was issued before a library was loaded.
    #[error("driver library is not loaded")]
    NotLoaded,
    /// The vendor returned a nonzero error code.
    #[error("{command}: {message}")]
    Command {
        /// Command name.
        command: &'static str,
        /// Vendor error code.
        code: u16,
        /// Vendor text for the code.
        message: String,
    },
    /// The device identifier could not be interpreted.
    #[error("unknown device '{0}' (expected usb, usb1-usb8, lpt1-lpt3 or an IPv4 address)")]
    UnknownDevice(String),
    /// The camera does not report the requested readout mode.
    #[error("readout mode {0} not reported by camera")]
    ReadoutModeMissing(u16),
}

/// Result type for vendor driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// The vendor's single command-dispatch entry point.
pub trait UniversalDriver {
    /// Issue a raw vendor command.
    ///
    /// # Safety
    ///
    /// `params` and `results` must each be null or point to a live value of the
    /// struct type the vendor ABI defines for `command`.
    #[allow(unsafe_code)]
    unsafe fn dispatch(&self, command: u16, params: *mut c_void, results: *mut c_void) -> i16;
}
