//! sbig-info: report driver, CCD, filter wheel, cooler and field-of-view
//! information for an SBIG camera.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sbig_util::camera::CcdCapabilities;
use sbig_util::{CcdChip, Config, DeviceSpec, FieldOfView, Handle};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "sbig-info",
    version,
    about = "Query an SBIG camera through the universal driver",
    after_help = "Environment: SBIG_UDRV (driver library), SBIG_DEVICE (usb, usb1-usb8, \
                  lpt1-lpt3 or an IPv4 address), SBIG_CONFIG_FILE (TOML config file)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show driver version and name
    Driver,
    /// Show CCD information
    Ccd {
        /// Which chip to query
        chip: Chip,
    },
    /// Show colour filter wheel information
    Cfw,
    /// Show cooler status
    Cooler,
    /// Show field of view for a focal length
    Fov {
        /// Which chip to use
        chip: Chip,
        /// Focal length in mm; defaults to `focal_length` from the config file
        focal_length: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Chip {
    Tracking,
    Imaging,
}

impl From<Chip> for CcdChip {
    fn from(chip: Chip) -> Self {
        match chip {
            Chip::Tracking => Self::Tracking,
            Chip::Imaging => Self::Imaging,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sbig_util=warn")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(i32::from(err.use_stderr()));
        }
    };

    if let Err(err) = run(cli.command) {
        eprintln!("sbig-info: {err:#}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    let config = Config::from_env()?;
    debug!(driver = %config.driver_path.display(), device = %config.device, "configuration loaded");

    match command {
        Command::Driver => show_driver(&config),
        Command::Ccd { chip } => show_ccd(&config, chip.into()),
        Command::Cfw => show_cfw(&config),
        Command::Cooler => show_cooler(&config),
        Command::Fov { chip, focal_length } => show_fov(&config, chip.into(), focal_length),
    }
}

/// Load the library and open the driver.
fn init_driver(config: &Config) -> Result<Handle> {
    let handle = Handle::open(Some(config.driver_path.as_path()))?;
    handle.open_driver()?;
    Ok(handle)
}

fn fini_driver(handle: Handle) -> Result<()> {
    handle.close_driver()?;
    Ok(())
}

/// Open the configured device and establish the camera link.
fn init_device(handle: &Handle, config: &Config) -> Result<()> {
    let device: DeviceSpec = config.device.parse()?;
    handle.open_device(device)?;
    handle.establish_link()?;
    Ok(())
}

fn fini_device(handle: &Handle) -> Result<()> {
    handle.close_device()?;
    Ok(())
}

/// Run `query` with the device open, then close device and driver.
fn with_device<T, F>(config: &Config, query: F) -> Result<T>
where
    F: FnOnce(&Handle) -> Result<T>,
{
    let handle = init_driver(config)?;
    init_device(&handle, config)?;
    let value = query(&handle)?;
    fini_device(&handle)?;
    fini_driver(handle)?;
    Ok(value)
}

fn show_driver(config: &Config) -> Result<()> {
    let handle = init_driver(config)?;
    let info = handle.driver_info()?;
    println!("version: {}", info.version);
    println!("name:    {}", info.name);
    println!("maxreq:  {}", info.max_request);
    fini_driver(handle)
}

fn show_ccd(config: &Config, chip: CcdChip) -> Result<()> {
    with_device(config, |handle| {
        let info = handle.ccd_info(chip)?;
        println!("firmware-version: {}", info.firmware_version);
        println!(
            "camera-type:      {}",
            sbig_util::camera::camera_type_name(info.camera_type)
        );
        println!("name:             {}", info.name);
        println!("readout-modes:");
        for mode in &info.readout_modes {
            println!("{mode}");
        }
        if chip == CcdChip::Imaging {
            let extended = handle.ccd_extended_info()?;
            println!("bad columns:       {}", extended.bad_columns);
            println!("ABG:               {}", yes_no(extended.abg));
            println!("serial-number:     {}", extended.serial_number);
            print_capabilities(handle.ccd_capabilities(chip)?);
        }
        Ok(())
    })
}

fn print_capabilities(cap: CcdCapabilities) {
    println!(
        "ccd-type:          {}",
        if cap.frame_transfer() {
            "frame_transfer"
        } else {
            "full frame"
        }
    );
    println!(
        "electronic-shutter:{}",
        if cap.electronic_shutter() {
            "Interline Imaging CCD with electronic shutter and ms exposure"
        } else {
            "no"
        }
    );
    println!("remote-guide-port: {}", yes_no(cap.remote_guide_port()));
    println!("biorad-tdi-mode:   {}", yes_no(cap.biorad_tdi()));
    println!("AO8-detected:      {}", yes_no(cap.ao8()));
    println!("frame-buffer:      {}", yes_no(cap.frame_buffer()));
    println!("use-startexp2:     {}", yes_no(cap.requires_start_exposure2()));
}

fn show_cfw(config: &Config) -> Result<()> {
    with_device(config, |handle| {
        let info = handle.cfw_info()?;
        println!("model:            {}", info.model_name());
        println!("firmware-version: {}", info.firmware_version);
        println!("num-positions:    {}", info.positions);
        Ok(())
    })
}

fn show_cooler(config: &Config) -> Result<()> {
    with_device(config, |handle| {
        let t = handle.temperature_status()?;
        println!(
            "cooling:              {}",
            if t.cooling_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!("imaging ccd setpoint: {:.2}C", t.imaging_setpoint);
        println!("imaging ccd:          {:.2}C", t.imaging_temperature);
        println!("tracking setpoint:    {:.2}C", t.tracking_setpoint);
        println!("tracking ccd:         {:.2}C", t.tracking_temperature);
        println!("ambient:              {:.2}C", t.ambient_temperature);
        println!("heatsink:             {:.2}C", t.heatsink_temperature);
        println!("imaging pwr:          {:.0}%", t.imaging_power);
        println!("tracking pwr:         {:.0}%", t.tracking_power);
        println!("fan:                  {}", t.fan);
        println!("fan pwr:              {:.0}%", t.fan_power);
        println!("fan speed:            {:.0}RPM", t.fan_speed);
        Ok(())
    })
}

fn show_fov(config: &Config, chip: CcdChip, focal_length: Option<f64>) -> Result<()> {
    let focal_length = focal_length
        .or(config.focal_length)
        .filter(|mm| *mm != 0.0)
        .with_context(|| {
            format!(
                "Please set focal_length in {} or on the command line",
                config.config_file.display()
            )
        })?;
    if !focal_length.is_finite() || focal_length < 0.0 {
        bail!("invalid focal length {focal_length}");
    }
    println!("focal length: {focal_length:.2}mm");

    let fov: FieldOfView = with_device(config, |handle| Ok(handle.field_of_view(chip, focal_length)?))?;
    println!(
        "sensor: {:.2}mm H x {:.2}mm W",
        fov.sensor_height_mm, fov.sensor_width_mm
    );
    println!(
        "field of view: {:.2}'H x {:.2}'W",
        fov.height_arcmin, fov.width_arcmin
    );
    if fov.exceeds_one_degree() {
        println!(
            "           or: {:.2} x {:.2} degrees",
            fov.height_arcmin / 60.0,
            fov.width_arcmin / 60.0
        );
    }
    Ok(())
}

const fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
