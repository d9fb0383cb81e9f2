//! Mock vendor driver for testing without hardware or `libsbig.so`.

#![allow(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::ffi::c_void;

use crate::ffi::{
    self, ccd_request, cmd, err, CfwParams, CfwResults, EstablishLinkResults,
    GetCcdInfoParams, GetCcdInfoResults0, GetCcdInfoResults2, GetCcdInfoResults4,
    GetDriverInfoResults0, GetErrorStringParams, GetErrorStringResults, OpenDeviceParams,
    QueryTemperatureStatusParams, QueryTemperatureStatusResults2, ReadoutInfo,
};
use crate::traits::UniversalDriver;

/// Camera type code the mock reports (ST-8).
pub const MOCK_CAMERA_TYPE: u16 = 5;

/// Mock driver emulating an ST-8 with a filter wheel on the other end of
/// `SBIGUnivDrvCommand`.
///
/// Tracks driver/device open state the way the vendor does: device commands
/// fail with `DEVICE_NOT_OPEN` until `OPEN_DEVICE`, and everything except
/// error translation fails with `DRIVER_NOT_OPEN` until `OPEN_DRIVER`.
#[derive(Debug, Default)]
pub struct MockDriver {
    failing: Vec<u16>,
    driver_open: Cell<bool>,
    device_open: Cell<bool>,
    opened_device: Cell<Option<OpenDeviceParams>>,
    calls: RefCell<Vec<u16>>,
    null_calls: Cell<u32>,
}

impl MockDriver {
    /// Create a mock with driver and device closed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` fail with `OS_ERROR`.
    #[must_use]
    pub fn failing(mut self, command: u16) -> Self {
        self.failing.push(command);
        self
    }

    /// Commands received so far, in order.
    pub fn calls(&self) -> Vec<u16> {
        self.calls.borrow().clone()
    }

    /// Number of calls made with both pointers null.
    pub fn null_calls(&self) -> u32 {
        self.null_calls.get()
    }

    /// Parameters of the last successful `OPEN_DEVICE`.
    pub fn opened_device(&self) -> Option<OpenDeviceParams> {
        self.opened_device.get()
    }

    /// Whether the driver is currently open.
    pub fn is_driver_open(&self) -> bool {
        self.driver_open.get()
    }

    /// Whether the device is currently open.
    pub fn is_device_open(&self) -> bool {
        self.device_open.get()
    }

    fn error_text(code: u16) -> Option<&'static str> {
        match code {
            err::CAMERA_NOT_FOUND => Some("Camera Not Found"),
            err::BAD_PARAMETER => Some("Bad Parameter"),
            err::DRIVER_NOT_OPEN => Some("Driver Not Open"),
            err::DEVICE_NOT_OPEN => Some("Device Not Open"),
            err::OS_ERROR => Some("OS Error"),
            _ => None,
        }
    }

    unsafe fn handle(&self, command: u16, params: *mut c_void, results: *mut c_void) -> u16 {
        match command {
            cmd::GET_ERROR_STRING => {
                let params = &*params.cast::<GetErrorStringParams>();
                let results = &mut *results.cast::<GetErrorStringResults>();
                match Self::error_text(params.error_no) {
                    Some(text) => {
                        write_field(&mut results.error_string, text);
                        err::NO_ERROR
                    }
                    None => err::BAD_PARAMETER,
                }
            }
            cmd::OPEN_DRIVER => {
                self.driver_open.set(true);
                err::NO_ERROR
            }
            _ if !self.driver_open.get() => err::DRIVER_NOT_OPEN,
            cmd::CLOSE_DRIVER => {
                self.driver_open.set(false);
                err::NO_ERROR
            }
            cmd::GET_DRIVER_INFO => {
                let results = &mut *results.cast::<GetDriverInfoResults0>();
                results.version = 0x0412;
                write_field(&mut results.name, "SBIGUDrv");
                results.max_request = 1;
                err::NO_ERROR
            }
            cmd::OPEN_DEVICE => {
                let params = *params.cast::<OpenDeviceParams>();
                self.device_open.set(true);
                self.opened_device.set(Some(params));
                err::NO_ERROR
            }
            _ if !self.device_open.get() => err::DEVICE_NOT_OPEN,
            cmd::CLOSE_DEVICE => {
                self.device_open.set(false);
                err::NO_ERROR
            }
            cmd::ESTABLISH_LINK => {
                let results = &mut *results.cast::<EstablishLinkResults>();
                results.camera_type = MOCK_CAMERA_TYPE;
                err::NO_ERROR
            }
            cmd::GET_CCD_INFO => {
                let params = &*params.cast::<GetCcdInfoParams>();
                fill_ccd_info(params.request, results)
            }
            cmd::QUERY_TEMPERATURE_STATUS => {
                let params = &*params.cast::<QueryTemperatureStatusParams>();
                if params.request != ffi::TEMP_STATUS_ADVANCED2 {
                    return err::BAD_PARAMETER;
                }
                *results.cast::<QueryTemperatureStatusResults2>() = QueryTemperatureStatusResults2 {
                    cooling_enabled: 1,
                    fan_enabled: ffi::FS_ON,
                    ccd_setpoint: -10.0,
                    imaging_ccd_temperature: -9.75,
                    tracking_ccd_temperature: -8.5,
                    external_tracking_ccd_temperature: 0.0,
                    ambient_temperature: 18.25,
                    imaging_ccd_power: 62.0,
                    tracking_ccd_power: 0.0,
                    external_tracking_ccd_power: 0.0,
                    heatsink_temperature: 21.5,
                    fan_power: 100.0,
                    fan_speed: 3200.0,
                    tracking_ccd_setpoint: -10.0,
                };
                err::NO_ERROR
            }
            cmd::CFW => {
                let params = &*params.cast::<CfwParams>();
                if params.cfw_command != ffi::CFWC_GET_INFO
                    || params.cfw_param1 != ffi::CFWG_FIRMWARE_VERSION
                {
                    return err::BAD_PARAMETER;
                }
                *results.cast::<CfwResults>() = CfwResults {
                    cfw_model: 8,
                    cfw_result1: 2,
                    cfw_result2: 10,
                    ..CfwResults::default()
                };
                err::NO_ERROR
            }
            _ => err::BAD_PARAMETER,
        }
    }
}

impl UniversalDriver for MockDriver {
    unsafe fn dispatch(&self, command: u16, params: *mut c_void, results: *mut c_void) -> i16 {
        self.calls.borrow_mut().push(command);
        if params.is_null() && results.is_null() {
            self.null_calls.set(self.null_calls.get() + 1);
        }
        let code = if self.failing.contains(&command) {
            err::OS_ERROR
        } else {
            self.handle(command, params, results)
        };
        i16::from_ne_bytes(code.to_ne_bytes())
    }
}

unsafe fn fill_ccd_info(request: u16, results: *mut c_void) -> u16 {
    match request {
        ccd_request::IMAGING => {
            let info = &mut *results.cast::<GetCcdInfoResults0>();
            info.firmware_version = 0x0117;
            info.camera_type = MOCK_CAMERA_TYPE;
            write_field(&mut info.name, "SBIG ST-8 Dual CCD Camera");
            info.readout_modes = 2;
            info.readout_info[0] = ReadoutInfo {
                mode: ffi::RM_1X1,
                width: 1530,
                height: 1020,
                gain: 0x0250,
                pixel_width: 0x0900,
                pixel_height: 0x0900,
            };
            info.readout_info[1] = ReadoutInfo {
                mode: 1,
                width: 765,
                height: 510,
                gain: 0x0250,
                pixel_width: 0x1800,
                pixel_height: 0x1800,
            };
            err::NO_ERROR
        }
        ccd_request::TRACKING => {
            let info = &mut *results.cast::<GetCcdInfoResults0>();
            info.firmware_version = 0x0117;
            info.camera_type = MOCK_CAMERA_TYPE;
            write_field(&mut info.name, "SBIG ST-8 Dual CCD Camera");
            info.readout_modes = 1;
            info.readout_info[0] = ReadoutInfo {
                mode: ffi::RM_1X1,
                width: 657,
                height: 495,
                gain: 0x0180,
                pixel_width: 0x0740,
                pixel_height: 0x0740,
            };
            err::NO_ERROR
        }
        ccd_request::EXTENDED => {
            let info = &mut *results.cast::<GetCcdInfoResults2>();
            info.bad_columns = 1;
            info.imaging_abg = ffi::ABG_PRESENT;
            write_field(&mut info.serial_number, "05121234");
            err::NO_ERROR
        }
        ccd_request::EXTENDED2_IMAGING | ccd_request::EXTENDED2_TRACKING => {
            let info = &mut *results.cast::<GetCcdInfoResults4>();
            info.capabilities_bits = ffi::cap::CCD_EXT_TRACKER_YES | ffi::cap::FRAME_BUFFER_YES;
            err::NO_ERROR
        }
        _ => err::BAD_PARAMETER,
    }
}

fn write_field(dest: &mut [u8], text: &str) {
    dest.fill(0);
    let len = text.len().min(dest.len().saturating_sub(1));
    dest[..len].copy_from_slice(&text.as_bytes()[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Handle;
    use crate::ffi::{GetDriverInfo, GetDriverInfoParams, OpenDriver};

    #[test]
    fn test_mock_requires_open_driver() {
        let handle = Handle::with_driver(MockDriver::new());
        assert!(handle
            .issue::<GetDriverInfo>(GetDriverInfoParams::default())
            .is_err());
        handle.issue::<OpenDriver>(()).expect("open_driver failed");
        let info = handle
            .issue::<GetDriverInfo>(GetDriverInfoParams::default())
            .expect("get_driver_info failed");
        assert_eq!(info.version, 0x0412);
    }

    #[test]
    fn test_mock_failing_command() {
        let handle = Handle::with_driver(MockDriver::new().failing(cmd::OPEN_DRIVER));
        let err = handle.issue::<OpenDriver>(()).expect_err("open_driver should fail");
        assert!(err.to_string().contains("OS Error"), "{err}");
    }

    #[test]
    fn test_write_field_truncates_and_terminates() {
        let mut buf = [0xFFu8; 4];
        write_field(&mut buf, "ABCDEF");
        assert_eq!(&buf, b"ABC\0");
    }
}
