//! Vendor universal driver ABI: command codes, error codes and the
//! parameter/result structs passed to `SBIGUnivDrvCommand`.
//!
//! Layouts follow the vendor header for LP64 Linux (`unsigned long` is the
//! platform `c_ulong`).

#![allow(missing_docs)]

use std::ffi::{c_short, c_ulong, c_ushort, c_void};
use std::ptr;

/// Signature of the vendor dispatch entry point.
pub type DispatchFn =
    unsafe extern "C" fn(command: c_ushort, params: *mut c_void, results: *mut c_void) -> c_short;

/// Vendor `unsigned long`.
pub type Ulong = c_ulong;

/// Library opened when no path is configured.
pub const DEFAULT_LIBRARY: &str = "libsbig.so";

/// Name of the dispatch symbol.
pub const DISPATCH_SYMBOL: &str = "SBIGUnivDrvCommand";

/// Command codes (`PAR_COMMAND`).
pub mod cmd {
    pub const QUERY_TEMPERATURE_STATUS: u16 = 6;
    pub const ESTABLISH_LINK: u16 = 9;
    pub const GET_DRIVER_INFO: u16 = 10;
    pub const GET_CCD_INFO: u16 = 11;
    pub const OPEN_DRIVER: u16 = 17;
    pub const CLOSE_DRIVER: u16 = 18;
    pub const OPEN_DEVICE: u16 = 27;
    pub const CLOSE_DEVICE: u16 = 28;
    pub const GET_ERROR_STRING: u16 = 36;
    pub const CFW: u16 = 43;
}

/// Error codes (`PAR_ERROR`).
pub mod err {
    pub const NO_ERROR: u16 = 0;
    pub const CAMERA_NOT_FOUND: u16 = 1;
    pub const BAD_PARAMETER: u16 = 6;
    pub const DRIVER_NOT_OPEN: u16 = 20;
    pub const DEVICE_NOT_OPEN: u16 = 28;
    pub const OS_ERROR: u16 = 32;
}

/// Device types accepted by `CC_OPEN_DEVICE`.
pub mod dev {
    pub const LPT1: u16 = 1;
    pub const LPT2: u16 = 2;
    pub const LPT3: u16 = 3;
    pub const USB: u16 = 0x7F00;
    pub const ETH: u16 = 0x7F01;
    pub const USB1: u16 = 0x7F02;
}

/// `GET_CCD_INFO` request selectors.
pub mod ccd_request {
    pub const IMAGING: u16 = 0;
    pub const TRACKING: u16 = 1;
    pub const EXTENDED: u16 = 2;
    pub const EXTENDED2_IMAGING: u16 = 4;
    pub const EXTENDED2_TRACKING: u16 = 5;
}

/// Capability bits reported by `GET_CCD_INFO` request 4/5.
pub mod cap {
    pub const CCD_TYPE_FRAME_TRANSFER: u16 = 0x0001;
    pub const CCD_ESHUTTER_YES: u16 = 0x0002;
    pub const CCD_EXT_TRACKER_YES: u16 = 0x0004;
    pub const CCD_BTDI_YES: u16 = 0x0008;
    pub const AO8_YES: u16 = 0x0010;
    pub const FRAME_BUFFER_YES: u16 = 0x0020;
    pub const REQUIRES_STARTEXP2_YES: u16 = 0x0040;
}

/// `TEMP_STATUS_ADVANCED2` request for `QUERY_TEMPERATURE_STATUS`.
pub const TEMP_STATUS_ADVANCED2: u16 = 2;
/// Readout mode 0, full resolution.
pub const RM_1X1: u16 = 0;
/// `ABG_PRESENT` value of `imaging_abg`.
pub const ABG_PRESENT: u16 = 1;
/// `CFWSEL_AUTO` model selector.
pub const CFWSEL_AUTO: u16 = 6;
/// `CFWC_GET_INFO` filter wheel command.
pub const CFWC_GET_INFO: u16 = 3;
/// `CFWG_FIRMWARE_VERSION` selector for `CFWC_GET_INFO`.
pub const CFWG_FIRMWARE_VERSION: Ulong = 0;
/// Fan states.
pub const FS_OFF: u16 = 0;
/// Fan forced on.
pub const FS_ON: u16 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetErrorStringParams {
    pub error_no: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GetErrorStringResults {
    pub error_string: [u8; 64],
}

impl Default for GetErrorStringResults {
    fn default() -> Self {
        Self {
            error_string: [0; 64],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetDriverInfoParams {
    pub request: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GetDriverInfoResults0 {
    pub version: u16,
    pub name: [u8; 64],
    pub max_request: u16,
}

impl Default for GetDriverInfoResults0 {
    fn default() -> Self {
        Self {
            version: 0,
            name: [0; 64],
            max_request: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDeviceParams {
    pub device_type: u16,
    pub lpt_base_address: u16,
    pub ip_address: Ulong,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EstablishLinkParams {
    pub sbig_use_only: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EstablishLinkResults {
    pub camera_type: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCcdInfoParams {
    pub request: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadoutInfo {
    pub mode: u16,
    pub width: u16,
    pub height: u16,
    /// Electrons per ADU, BCD `XX.XX`.
    pub gain: u16,
    /// Microns, BCD `XXXXXX.XX`.
    pub pixel_width: Ulong,
    /// Microns, BCD `XXXXXX.XX`.
    pub pixel_height: Ulong,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GetCcdInfoResults0 {
    pub firmware_version: u16,
    pub camera_type: u16,
    pub name: [u8; 64],
    pub readout_modes: u16,
    pub readout_info: [ReadoutInfo; 20],
}

impl Default for GetCcdInfoResults0 {
    fn default() -> Self {
        Self {
            firmware_version: 0,
            camera_type: 0,
            name: [0; 64],
            readout_modes: 0,
            readout_info: [ReadoutInfo::default(); 20],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCcdInfoResults2 {
    pub bad_columns: u16,
    pub columns: [u16; 4],
    pub imaging_abg: u16,
    pub serial_number: [u8; 10],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCcdInfoResults4 {
    pub capabilities_bits: u16,
    pub dump_extra: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTemperatureStatusParams {
    pub request: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTemperatureStatusResults2 {
    pub cooling_enabled: u16,
    pub fan_enabled: u16,
    pub ccd_setpoint: f64,
    pub imaging_ccd_temperature: f64,
    pub tracking_ccd_temperature: f64,
    pub external_tracking_ccd_temperature: f64,
    pub ambient_temperature: f64,
    pub imaging_ccd_power: f64,
    pub tracking_ccd_power: f64,
    pub external_tracking_ccd_power: f64,
    pub heatsink_temperature: f64,
    pub fan_power: f64,
    pub fan_speed: f64,
    pub tracking_ccd_setpoint: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CfwParams {
    pub cfw_model: u16,
    pub cfw_command: u16,
    pub cfw_param1: Ulong,
    pub cfw_param2: Ulong,
    pub out_length: u16,
    pub out_ptr: *mut u8,
    pub in_length: u16,
    pub in_ptr: *mut u8,
}

impl Default for CfwParams {
    fn default() -> Self {
        Self {
            cfw_model: 0,
            cfw_command: 0,
            cfw_param1: 0,
            cfw_param2: 0,
            out_length: 0,
            out_ptr: ptr::null_mut(),
            in_length: 0,
            in_ptr: ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CfwResults {
    pub cfw_model: u16,
    pub cfw_position: u16,
    pub cfw_status: u16,
    pub cfw_error: u16,
    pub cfw_result1: Ulong,
    pub cfw_result2: Ulong,
}

/// A vendor command together with the struct types it exchanges.
///
/// Pairing the code with its types is what makes [`crate::Handle::issue`]
/// sound: the dispatch function is only ever handed pointers to the structs
/// the vendor expects for that code. A zero-sized `Params` or `Results` is
/// passed as a null pointer.
pub trait VendorCommand {
    /// Command code.
    const CODE: u16;
    /// Name used in diagnostics.
    const NAME: &'static str;
    /// Input struct.
    type Params;
    /// Output struct.
    type Results: Default;
}

macro_rules! vendor_command {
    ($(#[$meta:meta])* $name:ident, $code:expr, $label:literal, $params:ty, $results:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub enum $name {}

        impl VendorCommand for $name {
            const CODE: u16 = $code;
            const NAME: &'static str = $label;
            type Params = $params;
            type Results = $results;
        }
    };
}

vendor_command!(
    /// `CC_OPEN_DRIVER`.
    OpenDriver, cmd::OPEN_DRIVER, "open_driver", (), ()
);
vendor_command!(
    /// `CC_CLOSE_DRIVER`.
    CloseDriver, cmd::CLOSE_DRIVER, "close_driver", (), ()
);
vendor_command!(
    /// `CC_GET_DRIVER_INFO` with request 0.
    GetDriverInfo, cmd::GET_DRIVER_INFO, "get_driver_info", GetDriverInfoParams, GetDriverInfoResults0
);
vendor_command!(
    /// `CC_OPEN_DEVICE`.
    OpenDevice, cmd::OPEN_DEVICE, "open_device", OpenDeviceParams, ()
);
vendor_command!(
    /// `CC_CLOSE_DEVICE`.
    CloseDevice, cmd::CLOSE_DEVICE, "close_device", (), ()
);
vendor_command!(
    /// `CC_ESTABLISH_LINK`.
    EstablishLink, cmd::ESTABLISH_LINK, "establish_link", EstablishLinkParams, EstablishLinkResults
);
vendor_command!(
    /// `CC_GET_CCD_INFO` with request 0 or 1.
    GetCcdInfo0, cmd::GET_CCD_INFO, "get_ccd_info", GetCcdInfoParams, GetCcdInfoResults0
);
vendor_command!(
    /// `CC_GET_CCD_INFO` with request 2.
    GetCcdInfo2, cmd::GET_CCD_INFO, "get_ccd_info", GetCcdInfoParams, GetCcdInfoResults2
);
vendor_command!(
    /// `CC_GET_CCD_INFO` with request 4 or 5.
    GetCcdInfo4, cmd::GET_CCD_INFO, "get_ccd_info", GetCcdInfoParams, GetCcdInfoResults4
);
vendor_command!(
    /// `CC_QUERY_TEMPERATURE_STATUS` with the advanced-2 request.
    QueryTemperatureStatus, cmd::QUERY_TEMPERATURE_STATUS, "query_temperature_status",
    QueryTemperatureStatusParams, QueryTemperatureStatusResults2
);
vendor_command!(
    /// `CC_CFW`.
    Cfw, cmd::CFW, "cfw", CfwParams, CfwResults
);
vendor_command!(
    /// `CC_GET_ERROR_STRING`.
    GetErrorString, cmd::GET_ERROR_STRING, "get_error_string", GetErrorStringParams,
    GetErrorStringResults
);

/// Decode a NUL-terminated vendor string field.
#[must_use]
pub fn c_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(bytes.get(..end).unwrap_or(bytes))
        .trim_end()
        .to_owned()
}
