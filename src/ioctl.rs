//! Port re-binding request carried by the device ioctl.

use std::mem;

use tracing::error;

use crate::session::SessionRegistry;
use crate::traits::{HandleId, PortRegistrar, Result, SessionError};

/// Parameter block of the port-parameters ioctl, as laid out by the caller.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinuxLptPortParams {
    /// New base port.
    pub port_base: u16,
    /// New number of ports.
    pub port_span: u16,
}

impl LinuxLptPortParams {
    /// Size of the block in caller memory.
    pub const SIZE: usize = mem::size_of::<Self>();

    /// Copy the block out of caller-provided memory.
    ///
    /// Fields are in native byte order. `None` models an unmapped caller
    /// pointer; a block shorter than [`Self::SIZE`] is a fault as well.
    /// Trailing bytes beyond the block are ignored.
    pub fn copy_from_user(src: Option<&[u8]>) -> Result<Self> {
        let fault = |actual| SessionError::CopyFault {
            expected: Self::SIZE,
            actual,
        };
        let src = src.ok_or_else(|| fault(0))?;
        let (Some(base), Some(span)) = (src.get(0..2), src.get(2..4)) else {
            error!(len = src.len(), "copy_from_user: short parameter block");
            return Err(fault(src.len()));
        };
        let word = |bytes: &[u8]| {
            bytes
                .try_into()
                .map(u16::from_ne_bytes)
                .map_err(|_| fault(src.len()))
        };
        Ok(Self {
            port_base: word(base)?,
            port_span: word(span)?,
        })
    }

    /// Encode the block the way a caller would lay it out.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..2].copy_from_slice(&self.port_base.to_ne_bytes());
        out[2..].copy_from_slice(&self.port_span.to_ne_bytes());
        out
    }
}

impl<R: PortRegistrar> SessionRegistry<R> {
    /// Handle the port-parameters ioctl: copy the new range from caller
    /// memory and rebind the session to it.
    ///
    /// A copy fault leaves the session untouched.
    pub fn rebind_from_user(&self, handle: HandleId, src: Option<&[u8]>) -> Result<()> {
        let params = LinuxLptPortParams::copy_from_user(src)?;
        self.rebind_ports(handle, params.port_base, params.port_span)
    }
}
