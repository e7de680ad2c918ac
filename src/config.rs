//! Runtime configuration, read from a [ron] file.
//!
//! Each sensor section is optional: a configuration without a
//! `force_sensor` runs the tactile array alone, and vice versa.

use crate::filter_pipeline::{FilterModes, FilterSettings};
use crate::handshake::SetupConfig;
use crate::kalman_filter::KalmanParams;
use crate::real::Real;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, path::Path, str::FromStr, time::Duration};

/// Where the binary looks for its configuration unless told otherwise
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.ron";

/// Everything the acquisition program needs to know.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Loop timing
    pub simulation: SimulationConfig,
    /// Where records are sent
    pub client: ClientConfig,
    /// The serial force/torque sensor, if fitted
    #[serde(default)]
    pub force_sensor: Option<ForceSensorConfig>,
    /// The SPI tactile array, if fitted
    #[serde(default)]
    pub tactile_sensor: Option<TactileSensorConfig>,
}

/// Timing of the control loop. All durations are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Length of the running phase
    pub execution_time: f64,
    /// Tick period
    pub dt: f64,
    /// Length of the calibration phase
    pub calibration_time: f64,
    /// Percentage of the oldest calibration samples to discard, in `[0, 100)`
    pub calibration_trim: f64,
}

impl SimulationConfig {
    /// Ticks spent calibrating; also the calibration buffer capacity.
    pub fn calibration_ticks(&self) -> usize {
        (self.calibration_time / self.dt).round() as usize
    }

    /// Ticks spent running before the operator is asked to continue.
    pub fn execution_ticks(&self) -> usize {
        (self.execution_time / self.dt).round() as usize
    }

    /// The tick period as a [Duration]
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.dt)
    }
}

/// The UDP consumer of output records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Host name or address
    pub ip: String,
    /// UDP port
    pub port: u16,
}

/// Median-stage parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MedianConfig {
    /// Input median window
    pub window: usize,
    /// Output median window
    pub post_window: usize,
    /// Level below which the threshold stage snaps a reading to zero
    pub threshold: f64,
}

impl Default for MedianConfig {
    fn default() -> Self {
        Self {
            window: 5,
            post_window: 5,
            threshold: 0.0,
        }
    }
}

/// One sensor's filter cascade.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Kalman tuning
    pub kf: KalmanParams,
    /// Median tuning
    pub mf: MedianConfig,
    /// Optional stages
    pub modes: FilterModes,
}

impl FilterConfig {
    /// The settings a [crate::filter_pipeline::MultiChannelFilter] is built from.
    pub fn settings<T: Real>(&self) -> FilterSettings<T> {
        FilterSettings {
            window: self.mf.window,
            post_window: self.mf.post_window,
            threshold: T::from_f64(self.mf.threshold),
            kalman: self.kf,
            modes: self.modes,
        }
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.mf.window == 0 || self.mf.post_window == 0 {
            return Err(ConfigError::Invalid(format!(
                "{section}: median windows must be at least 1"
            )));
        }
        let kf = &self.kf;
        if kf.process_variance < 0.0
            || kf.measurement_variance < 0.0
            || kf.initial_error_covariance < 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "{section}: Kalman variances must not be negative"
            )));
        }
        Ok(())
    }
}

/// The serial force/torque sensor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ForceSensorConfig {
    /// Serial device; empty to pick one interactively
    #[serde(default)]
    pub port: String,
    /// Line speed; must match `setup.baud_rate_config`
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Mounting angle about Z, in degrees
    #[serde(default = "default_rotation")]
    pub rotation_deg: f64,
    /// Distance from the sensor origin to the fingertip along the tool axis
    #[serde(default)]
    pub fingertip_offset: Option<f64>,
    /// Filter cascade
    #[serde(default = "default_force_filter")]
    pub filter: FilterConfig,
    /// Sensor-side settings sent during the handshake
    #[serde(default)]
    pub setup: SetupConfig,
}

fn default_baud_rate() -> u32 {
    460_800
}

fn default_rotation() -> f64 {
    -45.0
}

fn default_force_filter() -> FilterConfig {
    FilterConfig {
        modes: FilterModes {
            relative: false,
            threshold: false,
            post_median: true,
        },
        ..FilterConfig::default()
    }
}

/// The four-channel tactile array behind an MCP3204.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TactileSensorConfig {
    /// spidev character device
    #[serde(default = "default_spi_device")]
    pub spi_device: String,
    /// SPI clock
    #[serde(default = "default_spi_speed")]
    pub spi_speed_hz: u32,
    /// ADC reference voltage
    pub v_ref: f64,
    /// GPIO character device carrying the LED enable line
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: String,
    /// Line offset of the LED enable output; no LED control when unset
    #[serde(default)]
    pub led_pin: Option<u32>,
    /// Factor applied to the filtered channels in output records; when unset
    /// the command picks one
    #[serde(default)]
    pub output_scale: Option<f64>,
    /// Filter cascade
    #[serde(default = "default_tactile_filter")]
    pub filter: FilterConfig,
}

fn default_spi_device() -> String {
    "/dev/spidev0.0".to_owned()
}

fn default_gpio_chip() -> String {
    "/dev/gpiochip0".to_owned()
}

fn default_spi_speed() -> u32 {
    1_600_000
}

fn default_tactile_filter() -> FilterConfig {
    FilterConfig {
        modes: FilterModes {
            relative: true,
            threshold: false,
            post_median: true,
        },
        ..FilterConfig::default()
    }
}

/// Why a configuration could not be loaded.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read
    Io(io::Error),
    /// The file is not valid RON for a [Config]
    Ron(ron::de::SpannedError),
    /// The values are out of range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(error) => write!(f, "io error: {error}"),
            ConfigError::Ron(error) => write!(f, "ron error: {error}"),
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ron::de::SpannedError> for ConfigError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::Ron(value)
    }
}

/// False for zero, negative, and NaN.
fn positive(value: f64) -> bool {
    value > 0.0
}

impl FromStr for Config {
    type Err = ConfigError;

    /// Parses and validates a configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Reads, parses, and validates the configuration at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        fs::read_to_string(path)?.parse()
    }

    /// Checks every value the control loop and filters depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if !positive(sim.dt) {
            return Err(ConfigError::Invalid("dt must be positive".into()));
        }
        if !positive(sim.calibration_time) || sim.calibration_ticks() == 0 {
            return Err(ConfigError::Invalid(
                "calibration_time must cover at least one tick".into(),
            ));
        }
        if !positive(sim.execution_time) {
            return Err(ConfigError::Invalid("execution_time must be positive".into()));
        }
        if !(0.0..100.0).contains(&sim.calibration_trim) {
            return Err(ConfigError::Invalid(format!(
                "calibration_trim {} is outside [0, 100)",
                sim.calibration_trim
            )));
        }

        if let Some(force) = &self.force_sensor {
            force.filter.validate("force_sensor")?;
        }
        if let Some(tactile) = &self.tactile_sensor {
            if !positive(tactile.v_ref) {
                return Err(ConfigError::Invalid("tactile_sensor: v_ref must be positive".into()));
            }
            tactile.filter.validate("tactile_sensor")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"(
        simulation: (execution_time: 60.0, dt: 0.01, calibration_time: 1.0, calibration_trim: 10.0),
        client: (ip: "127.0.0.1", port: 8080),
    )"#;

    #[test]
    fn shipped_config_is_valid() {
        let config: Config = include_str!("../configs/config.ron").parse().unwrap();
        assert!(config.force_sensor.is_some());
        assert!(config.tactile_sensor.is_some());
        assert_eq!(config.simulation.calibration_ticks(), 100);
    }

    #[test]
    fn sensor_sections_are_optional() {
        let config: Config = MINIMAL.parse().unwrap();
        assert!(config.force_sensor.is_none());
        assert!(config.tactile_sensor.is_none());
        assert_eq!(config.simulation.execution_ticks(), 6000);
        assert_eq!(config.client.port, 8080);
    }

    #[test]
    fn sensor_defaults_follow_mode_table() {
        let config: Config = r#"(
            simulation: (execution_time: 60.0, dt: 0.01, calibration_time: 1.0, calibration_trim: 10.0),
            client: (ip: "127.0.0.1", port: 8080),
            force_sensor: Some((port: "/dev/ttyUSB0")),
            tactile_sensor: Some((v_ref: 3.3)),
        )"#
        .parse()
        .unwrap();

        let force = config.force_sensor.unwrap();
        assert_eq!(force.baud_rate, 460_800);
        assert_eq!(force.rotation_deg, -45.0);
        assert!(!force.filter.modes.relative);
        assert!(!force.filter.modes.threshold);
        assert!(force.filter.modes.post_median);
        assert_eq!(force.setup, SetupConfig::default());

        let tactile = config.tactile_sensor.unwrap();
        assert!(tactile.filter.modes.relative);
        assert!(!tactile.filter.modes.threshold);
        assert_eq!(tactile.output_scale, None);
        assert_eq!(tactile.spi_device, "/dev/spidev0.0");
        assert_eq!(tactile.gpio_chip, "/dev/gpiochip0");
        assert_eq!(tactile.led_pin, None);
    }

    #[test]
    fn led_pin_is_read() {
        let config: Config = r#"(
            simulation: (execution_time: 60.0, dt: 0.01, calibration_time: 1.0, calibration_trim: 10.0),
            client: (ip: "127.0.0.1", port: 8080),
            tactile_sensor: Some((v_ref: 3.3, gpio_chip: "/dev/gpiochip4", led_pin: Some(17))),
        )"#
        .parse()
        .unwrap();

        let tactile = config.tactile_sensor.unwrap();
        assert_eq!(tactile.gpio_chip, "/dev/gpiochip4");
        assert_eq!(tactile.led_pin, Some(17));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad_trim = MINIMAL.replace("calibration_trim: 10.0", "calibration_trim: 100.0");
        assert!(matches!(bad_trim.parse::<Config>(), Err(ConfigError::Invalid(_))));

        let bad_dt = MINIMAL.replace("dt: 0.01", "dt: 0.0");
        assert!(matches!(bad_dt.parse::<Config>(), Err(ConfigError::Invalid(_))));

        let bad_window = r#"(
            simulation: (execution_time: 60.0, dt: 0.01, calibration_time: 1.0, calibration_trim: 10.0),
            client: (ip: "127.0.0.1", port: 8080),
            tactile_sensor: Some((v_ref: 3.3, filter: (mf: (window: 0, post_window: 3, threshold: 0.0)))),
        )"#;
        assert!(matches!(bad_window.parse::<Config>(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_file_is_a_ron_error() {
        assert!(matches!("(simulation: ".parse::<Config>(), Err(ConfigError::Ron(_))));
    }

    #[test]
    fn loads_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.client.ip, "127.0.0.1");

        assert!(matches!(
            Config::from_path(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn filter_settings_carry_over() {
        let filter = default_tactile_filter();
        let settings = filter.settings::<f32>();
        assert_eq!(settings.window, 5);
        assert!(settings.modes.relative);
        assert_eq!(settings.kalman, KalmanParams::default());
    }
}
