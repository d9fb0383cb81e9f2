//! Per-handle device sessions for the parallel-port camera interface.
//!
//! A [`SessionRegistry`] owns every open session and the registrar that
//! arbitrates I/O-port reservations. Callers refer to a session only through
//! its [`HandleId`]; closing twice or using a closed handle is reported as an
//! error instead of touching freed state.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::traits::{HandleId, OpenMode, PortRange, PortRegistrar, Result, SessionError};

/// Label under which sessions register their port reservations.
pub const DEVICE_NAME: &str = "sbiglpt";

/// Default base port (LPT1).
pub const DEFAULT_PORT_BASE: u16 = 0x378;

/// Default number of ports claimed (data, status and control registers).
pub const DEFAULT_PORT_SPAN: u16 = 3;

/// Default I/O buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// State owned by one open device handle.
#[derive(Debug)]
pub struct Session {
    port_base: u16,
    port_span: u16,
    ports_claimed: bool,
    buffer: Vec<u8>,
    device_name: &'static str,
    /// Driver flags.
    pub flags: u32,
    /// Last value written to the control register.
    pub control_out: u8,
    /// Imaging clock lines last driven.
    pub imaging_clocks_out: u8,
    /// Bytes read through this handle.
    pub read_count: u64,
    /// Bytes written through this handle.
    pub write_count: u64,
    /// Driver state machine value.
    pub state: u32,
}

impl Session {
    /// Allocate a fully initialised session.
    fn allocate(port_base: u16, port_span: u16, buffer_size: usize) -> Result<Self> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(buffer_size)
            .map_err(|_| SessionError::OutOfMemory {
                what: "I/O buffer",
                size: buffer_size,
            })?;
        buffer.resize(buffer_size, 0);

        Ok(Self {
            port_base,
            port_span,
            ports_claimed: false,
            buffer,
            device_name: DEVICE_NAME,
            flags: 0,
            control_out: 0,
            imaging_clocks_out: 0,
            read_count: 0,
            write_count: 0,
            state: 0,
        })
    }

    /// Port range the session is bound to.
    #[must_use]
    pub const fn port_range(&self) -> PortRange {
        PortRange::new(self.port_base, self.port_span)
    }

    /// First port of the bound range.
    #[must_use]
    pub const fn port_base(&self) -> u16 {
        self.port_base
    }

    /// Number of ports in the bound range.
    #[must_use]
    pub const fn port_span(&self) -> u16 {
        self.port_span
    }

    /// Whether the session currently holds its port reservation.
    #[must_use]
    pub const fn ports_claimed(&self) -> bool {
        self.ports_claimed
    }

    /// Label used for port reservations.
    #[must_use]
    pub const fn device_name(&self) -> &'static str {
        self.device_name
    }

    /// The session's I/O buffer.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Mutable access to the I/O buffer.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Size of the I/O buffer in bytes.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

/// Point-in-time view of a session, as emitted by the diagnostic dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Reservation label.
    pub device_name: &'static str,
    /// Bound port range.
    pub port_range: PortRange,
    /// Whether the range is currently reserved.
    pub ports_claimed: bool,
    /// Address of the I/O buffer.
    pub buffer_addr: usize,
    /// Size of the I/O buffer.
    pub buffer_size: usize,
    /// Mode the handle was opened with.
    pub open_mode: OpenMode,
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device private data :")?;
        writeln!(f, "dev_name    : {}", self.device_name)?;
        writeln!(f, "port_base   : {:x}", self.port_range.base)?;
        writeln!(f, "port_span   : {:x}", self.port_range.span)?;
        writeln!(
            f,
            "buffer      : p = {:#x},  size = {}",
            self.buffer_addr, self.buffer_size
        )?;
        if let Some(mode) = self.open_mode.describe() {
            writeln!(f, "I/O mode    : {mode}")?;
        }
        Ok(())
    }
}

/// Registry of open device sessions.
///
/// The slot map is guarded by a lock owned by the registry. Port operations
/// hold it for the duration of the registrar call so a concurrent close
/// cannot strand a reservation.
#[derive(Debug)]
pub struct SessionRegistry<R> {
    sessions: Mutex<HashMap<HandleId, Session>>,
    registrar: R,
    next_handle: AtomicU64,
}

impl<R: PortRegistrar> SessionRegistry<R> {
    /// Create an empty registry reserving ports through `registrar`.
    pub fn new(registrar: R) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            registrar,
            next_handle: AtomicU64::new(1),
        }
    }

    /// The registrar backing this registry.
    pub const fn registrar(&self) -> &R {
        &self.registrar
    }

    /// Hand out a fresh handle identifier.
    pub fn allocate_handle(&self) -> HandleId {
        HandleId(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<HandleId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session on `handle`.
    ///
    /// # Arguments
    ///
    /// * `handle` - Handle to attach the session to
    /// * `port_base` - First I/O port the session will drive
    /// * `port_span` - Number of contiguous ports
    /// * `buffer_size` - Size of the zero-filled I/O buffer
    ///
    /// # Errors
    ///
    /// * `AlreadyOpen` if the handle already carries a session
    /// * `OutOfMemory` if the session or its buffer cannot be allocated; the
    ///   slot is left empty
    ///
    /// The session is fully initialised before it becomes visible in the
    /// registry. Ports are not reserved here; see [`Self::acquire_ports`].
    pub fn open(
        &self,
        handle: HandleId,
        port_base: u16,
        port_span: u16,
        buffer_size: usize,
    ) -> Result<()> {
        if self.lock().contains_key(&handle) {
            warn!(%handle, "device already open");
            return Err(SessionError::AlreadyOpen(handle));
        }

        let session = Session::allocate(port_base, port_span, buffer_size).inspect_err(|err| {
            error!(%handle, %err, "session allocation failed");
        })?;

        // Re-check under the lock: another opener may have won the slot while
        // the buffer was being allocated.
        let mut sessions = self.lock();
        if sessions.contains_key(&handle) {
            warn!(%handle, "device already open");
            return Err(SessionError::AlreadyOpen(handle));
        }
        sessions
            .try_reserve(1)
            .map_err(|_| SessionError::OutOfMemory {
                what: "session",
                size: mem::size_of::<Session>(),
            })?;
        sessions.insert(handle, session);

        info!(
            %handle,
            range = %PortRange::new(port_base, port_span),
            buffer_size,
            "session opened"
        );
        Ok(())
    }

    /// Close the session on `handle`, if any.
    ///
    /// Releases the port reservation if the session still holds one, then
    /// drops the buffer and the session. Closing a handle without a session
    /// is a no-op.
    pub fn close(&self, handle: HandleId) -> Result<()> {
        let mut sessions = self.lock();
        let Some(session) = sessions.remove(&handle) else {
            return Ok(());
        };
        if session.ports_claimed {
            if let Err(err) = self.registrar.release(session.port_range()) {
                warn!(%handle, %err, "port release on close failed");
            }
        }
        drop(sessions);
        drop(session);
        info!(%handle, "session closed");
        Ok(())
    }

    /// Whether `handle` carries a session.
    pub fn is_open(&self, handle: HandleId) -> bool {
        self.lock().contains_key(&handle)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` against the session on `handle`.
    pub fn with_session<T, F>(&self, handle: HandleId, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> T,
    {
        let sessions = self.lock();
        let session = sessions.get(&handle).ok_or(SessionError::NotOpen(handle))?;
        Ok(f(session))
    }

    /// Run `f` against the session on `handle` with mutable access.
    ///
    /// Intended for the read/write paths that maintain the bookkeeping fields
    /// and the buffer; the port binding can only change through
    /// [`Self::rebind_ports`].
    pub fn with_session_mut<T, F>(&self, handle: HandleId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> T,
    {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(&handle)
            .ok_or(SessionError::NotOpen(handle))?;
        Ok(f(session))
    }

    /// Reserve the session's port range with the registrar.
    ///
    /// # Errors
    ///
    /// `PortBusy` if the registrar refuses, typically because a printer
    /// driver holds the port. Not retried.
    pub fn acquire_ports(&self, handle: HandleId) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(&handle)
            .ok_or(SessionError::NotOpen(handle))?;
        let range = session.port_range();

        self.registrar
            .request(range, session.device_name)
            .map_err(|source| {
                error!(
                    %handle,
                    port_base = range.base,
                    port_span = range.span,
                    %source,
                    "cannot reserve LPT ports; unload lp, parport_pc and parport"
                );
                SessionError::PortBusy { range, source }
            })?;
        session.ports_claimed = true;
        debug!(%handle, %range, "ports acquired");
        Ok(())
    }

    /// Release the session's port reservation.
    ///
    /// # Errors
    ///
    /// `NotReserved` if the session does not currently hold its range.
    pub fn release_ports(&self, handle: HandleId) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(&handle)
            .ok_or(SessionError::NotOpen(handle))?;
        let range = session.port_range();
        if !session.ports_claimed {
            warn!(%handle, %range, "release of ports that are not held");
            return Err(SessionError::NotReserved(range));
        }

        self.registrar
            .release(range)
            .map_err(|_| SessionError::NotReserved(range))?;
        session.ports_claimed = false;
        debug!(%handle, %range, "ports released");
        Ok(())
    }

    /// Move the session to a new port range.
    ///
    /// The new range is reserved before the old one is released. If the new
    /// reservation fails the session keeps its range and its reservation.
    /// Note that a new range overlapping the currently held one is refused,
    /// because the session's own claim occupies those ports.
    pub fn rebind_ports(&self, handle: HandleId, port_base: u16, port_span: u16) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(&handle)
            .ok_or(SessionError::NotOpen(handle))?;
        let current = session.port_range();
        let requested = PortRange::new(port_base, port_span);

        self.registrar
            .request(requested, session.device_name)
            .map_err(|source| {
                error!(
                    %handle,
                    %current,
                    %requested,
                    name = session.device_name,
                    %source,
                    "port rebind refused"
                );
                SessionError::PortBusy {
                    range: requested,
                    source,
                }
            })?;

        if session.ports_claimed {
            if let Err(err) = self.registrar.release(current) {
                warn!(%handle, %current, %err, "release of previous ports failed");
            }
        }
        session.port_base = port_base;
        session.port_span = port_span;
        session.ports_claimed = true;
        info!(%handle, from = %current, to = %requested, "ports rebound");
        Ok(())
    }

    /// Emit a diagnostic snapshot of the session as a debug event and return it.
    pub fn dump(&self, handle: HandleId, open_mode: OpenMode) -> Result<SessionSnapshot> {
        let snapshot = self.with_session(handle, |session| SessionSnapshot {
            device_name: session.device_name,
            port_range: session.port_range(),
            ports_claimed: session.ports_claimed,
            buffer_addr: session.buffer.as_ptr() as usize,
            buffer_size: session.buffer.len(),
            open_mode,
        })?;
        debug!(
            %handle,
            dev_name = snapshot.device_name,
            port_base = snapshot.port_range.base,
            port_span = snapshot.port_range.span,
            ports_claimed = snapshot.ports_claimed,
            buffer_addr = snapshot.buffer_addr,
            buffer_size = snapshot.buffer_size,
            io_mode = snapshot.open_mode.describe().unwrap_or("none"),
            "device private data"
        );
        Ok(snapshot)
    }
}
