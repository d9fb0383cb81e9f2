//! Typed camera queries issued through a driver [`Handle`].

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::{debug, info};

use crate::bcd;
use crate::device::Handle;
use crate::ffi::{
    self, cap, ccd_request, dev, CfwParams, CloseDevice, CloseDriver, EstablishLink,
    EstablishLinkParams, GetCcdInfo0, GetCcdInfo2, GetCcdInfo4, GetCcdInfoParams,
    GetDriverInfo, GetDriverInfoParams, OpenDevice, OpenDeviceParams, OpenDriver,
    QueryTemperatureStatus, QueryTemperatureStatusParams, Ulong,
};
use crate::traits::{DriverError, DriverResult, UniversalDriver};

/// Arc-minutes per radian.
const ARCMIN_PER_RADIAN: f64 = 3437.747;

/// Which CCD of a dual-chip camera to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcdChip {
    /// Main imaging sensor.
    Imaging,
    /// Built-in autoguider sensor.
    Tracking,
}

impl CcdChip {
    const fn info_request(self) -> u16 {
        match self {
            Self::Imaging => ccd_request::IMAGING,
            Self::Tracking => ccd_request::TRACKING,
        }
    }

    const fn extended2_request(self) -> u16 {
        match self {
            Self::Imaging => ccd_request::EXTENDED2_IMAGING,
            Self::Tracking => ccd_request::EXTENDED2_TRACKING,
        }
    }
}

/// Where the camera is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Parallel port 1-3.
    Lpt(u8),
    /// First USB camera found.
    Usb,
    /// USB camera 1-8.
    UsbN(u8),
    /// Ethernet camera at the given address.
    Ethernet(Ipv4Addr),
}

impl DeviceSpec {
    /// Conventional base port of an LPT device.
    #[must_use]
    pub const fn lpt_base_address(self) -> u16 {
        match self {
            Self::Lpt(1) => 0x378,
            Self::Lpt(2) => 0x278,
            Self::Lpt(3) => 0x3BC,
            _ => 0,
        }
    }

    fn open_params(self) -> OpenDeviceParams {
        let device_type = match self {
            Self::Lpt(1) => dev::LPT1,
            Self::Lpt(2) => dev::LPT2,
            Self::Lpt(_) => dev::LPT3,
            Self::Usb => dev::USB,
            Self::UsbN(n) => dev::USB1 + u16::from(n) - 1,
            Self::Ethernet(_) => dev::ETH,
        };
        let ip_address = match self {
            Self::Ethernet(addr) => Ulong::from(u32::from(addr)),
            _ => 0,
        };
        OpenDeviceParams {
            device_type,
            lpt_base_address: self.lpt_base_address(),
            ip_address,
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let numbered = |prefix: &str, max: u8| {
            lower
                .strip_prefix(prefix)
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (1..=max).contains(n))
        };

        if lower == "usb" {
            Ok(Self::Usb)
        } else if let Some(n) = numbered("usb", 8) {
            Ok(Self::UsbN(n))
        } else if let Some(n) = numbered("lpt", 3) {
            Ok(Self::Lpt(n))
        } else if let Ok(addr) = lower.parse::<Ipv4Addr>() {
            Ok(Self::Ethernet(addr))
        } else {
            Err(DriverError::UnknownDevice(s.to_owned()))
        }
    }
}

/// Driver identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// Version as `major.minor`.
    pub version: String,
    /// Driver name.
    pub name: String,
    /// Highest info request the driver supports.
    pub max_request: u16,
}

/// One binning mode of a CCD.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadoutMode {
    /// Vendor readout mode number.
    pub mode: u16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Electrons per ADU.
    pub gain: f64,
    /// Pixel width in microns.
    pub pixel_width: f64,
    /// Pixel height in microns.
    pub pixel_height: f64,
}

impl ReadoutMode {
    /// Sensor width in millimetres.
    #[must_use]
    pub fn sensor_width_mm(&self) -> f64 {
        1e-3 * f64::from(self.width) * self.pixel_width
    }

    /// Sensor height in millimetres.
    #[must_use]
    pub fn sensor_height_mm(&self) -> f64 {
        1e-3 * f64::from(self.height) * self.pixel_height
    }
}

impl fmt::Display for ReadoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:2}: {:4} x {:<4} {:2.2} e-/ADU {:3.2} x {:<3.2} microns",
            self.mode, self.width, self.height, self.gain, self.pixel_width, self.pixel_height
        )
    }
}

/// Basic CCD information (request 0 or 1).
#[derive(Debug, Clone, PartialEq)]
pub struct CcdInfo {
    /// Firmware version as `major.minor`.
    pub firmware_version: String,
    /// Vendor camera type code.
    pub camera_type: u16,
    /// Camera name.
    pub name: String,
    /// Supported readout modes.
    pub readout_modes: Vec<ReadoutMode>,
}

impl CcdInfo {
    /// Look up a readout mode by its vendor number.
    #[must_use]
    pub fn readout_mode(&self, mode: u16) -> Option<&ReadoutMode> {
        self.readout_modes.iter().find(|m| m.mode == mode)
    }
}

/// Extended imaging CCD information (request 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcdExtendedInfo {
    /// Number of bad columns.
    pub bad_columns: u16,
    /// Anti-blooming gate present.
    pub abg: bool,
    /// Serial number.
    pub serial_number: String,
}

/// Capability bits of a CCD (request 4 or 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcdCapabilities(pub u16);

impl CcdCapabilities {
    const fn has(self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    /// Frame transfer rather than full frame.
    #[must_use]
    pub const fn frame_transfer(self) -> bool {
        self.has(cap::CCD_TYPE_FRAME_TRANSFER)
    }

    /// Interline CCD with electronic shutter.
    #[must_use]
    pub const fn electronic_shutter(self) -> bool {
        self.has(cap::CCD_ESHUTTER_YES)
    }

    /// Remote guide head port present.
    #[must_use]
    pub const fn remote_guide_port(self) -> bool {
        self.has(cap::CCD_EXT_TRACKER_YES)
    }

    /// Supports BioRad TDI mode.
    #[must_use]
    pub const fn biorad_tdi(self) -> bool {
        self.has(cap::CCD_BTDI_YES)
    }

    /// AO-8 adaptive optics detected.
    #[must_use]
    pub const fn ao8(self) -> bool {
        self.has(cap::AO8_YES)
    }

    /// Camera has a frame buffer.
    #[must_use]
    pub const fn frame_buffer(self) -> bool {
        self.has(cap::FRAME_BUFFER_YES)
    }

    /// Exposures must be started with `START_EXPOSURE2`.
    #[must_use]
    pub const fn requires_start_exposure2(self) -> bool {
        self.has(cap::REQUIRES_STARTEXP2_YES)
    }
}

/// Fan operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    /// Fan off.
    Off,
    /// Fan forced on.
    Manual,
    /// Fan under automatic control.
    Auto,
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Manual => "manual",
            Self::Auto => "auto",
        })
    }
}

/// Cooler and temperature readings.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureStatus {
    /// Regulation enabled.
    pub cooling_enabled: bool,
    /// Imaging CCD setpoint, Celsius.
    pub imaging_setpoint: f64,
    /// Imaging CCD temperature, Celsius.
    pub imaging_temperature: f64,
    /// Tracking CCD setpoint, Celsius.
    pub tracking_setpoint: f64,
    /// Tracking CCD temperature, Celsius.
    pub tracking_temperature: f64,
    /// Ambient temperature, Celsius.
    pub ambient_temperature: f64,
    /// Heatsink temperature, Celsius.
    pub heatsink_temperature: f64,
    /// Imaging TE drive, percent.
    pub imaging_power: f64,
    /// Tracking TE drive, percent.
    pub tracking_power: f64,
    /// Fan mode.
    pub fan: FanMode,
    /// Fan drive, percent.
    pub fan_power: f64,
    /// Fan speed, RPM.
    pub fan_speed: f64,
}

/// Colour filter wheel information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfwInfo {
    /// Vendor model code.
    pub model: u16,
    /// Firmware version.
    pub firmware_version: u64,
    /// Number of filter positions.
    pub positions: u64,
}

impl CfwInfo {
    /// Model name.
    #[must_use]
    pub fn model_name(&self) -> &'static str {
        cfw_model_name(self.model)
    }
}

/// Field of view of a sensor behind optics of a given focal length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    /// Sensor height, millimetres.
    pub sensor_height_mm: f64,
    /// Sensor width, millimetres.
    pub sensor_width_mm: f64,
    /// Vertical field, arc-minutes.
    pub height_arcmin: f64,
    /// Horizontal field, arc-minutes.
    pub width_arcmin: f64,
}

impl FieldOfView {
    /// Compute the field of view of `mode` at `focal_length_mm`.
    #[must_use]
    pub fn new(mode: &ReadoutMode, focal_length_mm: f64) -> Self {
        let sensor_height_mm = mode.sensor_height_mm();
        let sensor_width_mm = mode.sensor_width_mm();
        Self {
            sensor_height_mm,
            sensor_width_mm,
            height_arcmin: ARCMIN_PER_RADIAN * sensor_height_mm / focal_length_mm,
            width_arcmin: ARCMIN_PER_RADIAN * sensor_width_mm / focal_length_mm,
        }
    }

    /// Whether the field is large enough to be worth quoting in degrees.
    #[must_use]
    pub fn exceeds_one_degree(&self) -> bool {
        self.height_arcmin > 60.0
    }
}

/// Name of a vendor camera type code.
#[must_use]
pub const fn camera_type_name(code: u16) -> &'static str {
    match code {
        4 => "ST-7",
        5 => "ST-8",
        6 => "ST-5C",
        7 => "TCE",
        8 => "ST-237",
        9 => "ST-K",
        10 => "ST-9",
        11 => "STV",
        12 => "ST-10",
        13 => "ST-1K",
        14 => "ST-2K",
        15 => "STL",
        16 => "ST-402",
        17 => "STX",
        18 => "ST-4K",
        19 => "STT",
        20 => "ST-i",
        21 => "STF-8300",
        0xFFFF => "no camera",
        _ => "unknown",
    }
}

/// Name of a vendor filter wheel model code.
#[must_use]
pub const fn cfw_model_name(code: u16) -> &'static str {
    match code {
        1 => "CFW-2",
        2 => "CFW-5",
        3 => "CFW-8",
        4 => "CFW-L",
        5 => "CFW-402",
        6 => "auto",
        7 => "CFW-6A",
        8 => "CFW-10",
        9 => "CFW-10 serial",
        10 => "CFW-9",
        11 => "CFW-L8",
        12 => "CFW-L8G",
        13 => "CFW-1603",
        14 => "FW5-STX",
        15 => "FW5-8300",
        16 => "FW8-8300",
        17 => "FW7-STX",
        18 => "FW8-STT",
        19 => "FW5-STF detent",
        _ => "unknown",
    }
}

impl<D: UniversalDriver> Handle<D> {
    /// Open the vendor driver.
    pub fn open_driver(&self) -> DriverResult<()> {
        self.issue::<OpenDriver>(())
    }

    /// Close the vendor driver.
    pub fn close_driver(&self) -> DriverResult<()> {
        self.issue::<CloseDriver>(())
    }

    /// Query the driver version and name.
    pub fn driver_info(&self) -> DriverResult<DriverInfo> {
        let raw = self.issue::<GetDriverInfo>(GetDriverInfoParams { request: 0 })?;
        Ok(DriverInfo {
            version: bcd::version(raw.version),
            name: ffi::c_field(&raw.name),
            max_request: raw.max_request,
        })
    }

    /// Open the camera device.
    pub fn open_device(&self, device: DeviceSpec) -> DriverResult<()> {
        debug!(?device, "opening device");
        self.issue::<OpenDevice>(device.open_params())
    }

    /// Close the camera device.
    pub fn close_device(&self) -> DriverResult<()> {
        self.issue::<CloseDevice>(())
    }

    /// Establish the link to the camera and return its type code.
    pub fn establish_link(&self) -> DriverResult<u16> {
        let raw = self.issue::<EstablishLink>(EstablishLinkParams { sbig_use_only: 0 })?;
        info!(camera = camera_type_name(raw.camera_type), "link established");
        Ok(raw.camera_type)
    }

    /// Basic information for one chip.
    pub fn ccd_info(&self, chip: CcdChip) -> DriverResult<CcdInfo> {
        let raw = self.issue::<GetCcdInfo0>(GetCcdInfoParams {
            request: chip.info_request(),
        })?;
        let count = usize::from(raw.readout_modes).min(raw.readout_info.len());
        let readout_modes = raw
            .readout_info
            .iter()
            .take(count)
            .map(|r| ReadoutMode {
                mode: r.mode,
                width: r.width,
                height: r.height,
                gain: bcd::bcd2_2(r.gain),
                pixel_width: bcd::bcd6_2(u64::from(r.pixel_width)),
                pixel_height: bcd::bcd6_2(u64::from(r.pixel_height)),
            })
            .collect();
        Ok(CcdInfo {
            firmware_version: bcd::version(raw.firmware_version),
            camera_type: raw.camera_type,
            name: ffi::c_field(&raw.name),
            readout_modes,
        })
    }

    /// Extended information for the imaging chip.
    pub fn ccd_extended_info(&self) -> DriverResult<CcdExtendedInfo> {
        let raw = self.issue::<GetCcdInfo2>(GetCcdInfoParams {
            request: ccd_request::EXTENDED,
        })?;
        Ok(CcdExtendedInfo {
            bad_columns: raw.bad_columns,
            abg: raw.imaging_abg == ffi::ABG_PRESENT,
            serial_number: ffi::c_field(&raw.serial_number),
        })
    }

    /// Capability bits for one chip.
    pub fn ccd_capabilities(&self, chip: CcdChip) -> DriverResult<CcdCapabilities> {
        let raw = self.issue::<GetCcdInfo4>(GetCcdInfoParams {
            request: chip.extended2_request(),
        })?;
        Ok(CcdCapabilities(raw.capabilities_bits))
    }

    /// Cooler and temperature readings.
    pub fn temperature_status(&self) -> DriverResult<TemperatureStatus> {
        let raw = self.issue::<QueryTemperatureStatus>(QueryTemperatureStatusParams {
            request: ffi::TEMP_STATUS_ADVANCED2,
        })?;
        let fan = match raw.fan_enabled {
            ffi::FS_OFF => FanMode::Off,
            ffi::FS_ON => FanMode::Manual,
            _ => FanMode::Auto,
        };
        Ok(TemperatureStatus {
            cooling_enabled: raw.cooling_enabled != 0,
            imaging_setpoint: raw.ccd_setpoint,
            imaging_temperature: raw.imaging_ccd_temperature,
            tracking_setpoint: raw.tracking_ccd_setpoint,
            tracking_temperature: raw.tracking_ccd_temperature,
            ambient_temperature: raw.ambient_temperature,
            heatsink_temperature: raw.heatsink_temperature,
            imaging_power: raw.imaging_ccd_power,
            tracking_power: raw.tracking_ccd_power,
            fan,
            fan_power: raw.fan_power,
            fan_speed: raw.fan_speed,
        })
    }

    /// Filter wheel model, firmware and number of positions.
    pub fn cfw_info(&self) -> DriverResult<CfwInfo> {
        let raw = self.issue::<ffi::Cfw>(CfwParams {
            cfw_model: ffi::CFWSEL_AUTO,
            cfw_command: ffi::CFWC_GET_INFO,
            cfw_param1: ffi::CFWG_FIRMWARE_VERSION,
            ..CfwParams::default()
        })?;
        Ok(CfwInfo {
            model: raw.cfw_model,
            firmware_version: u64::from(raw.cfw_result1),
            positions: u64::from(raw.cfw_result2),
        })
    }

    /// Field of view of `chip` in its full-resolution readout mode.
    pub fn field_of_view(&self, chip: CcdChip, focal_length_mm: f64) -> DriverResult<FieldOfView> {
        let info = self.ccd_info(chip)?;
        let mode = info
            .readout_mode(ffi::RM_1X1)
            .ok_or(DriverError::ReadoutModeMissing(ffi::RM_1X1))?;
        Ok(FieldOfView::new(mode, focal_length_mm))
    }
}
