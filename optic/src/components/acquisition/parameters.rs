use crate::devices::hardware::camera::PixelFormat;
use crate::error::{CaptureError, Result};
use chrono::{format::strftime::StrftimeItems, format::Item, DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::Duration,
};

/// How long and how often to look for a camera before giving up.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct DiscoveryPolicy {
    /// Number of discovery calls before `NoDeviceFound` is reported.
    pub max_tries: u32,
    /// Constant wait between two discovery calls, seconds.
    pub interval_secs: f64,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 6,
            interval_secs: 10.0,
        }
    }
}

impl DiscoveryPolicy {
    /// Wait between two discovery calls.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }
}

/// Every value a capture session needs. Built once when the process
/// starts and only ever handed out by reference afterwards.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ParameterSet {
    /// Requested exposure in microseconds.
    pub exposure_time: f64,
    /// Lower the frame rate to allow exposures longer than the default
    /// frame period instead of clamping them.
    pub exposure_long: bool,
    /// Frame rate used in long exposure mode, Hz.
    pub frame_rate: f64,
    /// Pixel format of the delivered frames.
    pub pixel_format: PixelFormat,
    /// Gain in dB, auto gain is switched off.
    pub gain: f64,
    /// Gamma correction.
    pub gamma: f64,
    /// Digital binning factor for both axes.
    pub binning: i64,
    /// Frames saved by the single buffer loop.
    pub num_images: usize,
    /// Buffers requested at once by the batch capture, also its pool size.
    pub num_buffers: usize,
    /// Pool size of the single buffer loop.
    pub stream_buffer_count: usize,
    /// Upper bound for a batch request, milliseconds.
    pub timeout_ms: u64,
    /// Parent directory of the per session image directories.
    pub output_root: PathBuf,
    /// `strftime` template for the session directory name.
    pub timestamp_format: String,
    /// File name prefix of the saved images.
    pub image_prefix: String,
    /// Retry budget of the device discovery.
    pub discovery: DiscoveryPolicy,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            exposure_time: 10000.0,
            exposure_long: true,
            frame_rate: 30.0,
            pixel_format: PixelFormat::Mono8,
            gain: 0.0,
            gamma: 1.0,
            binning: 1,
            num_images: 10,
            num_buffers: 1,
            stream_buffer_count: 100,
            timeout_ms: 2000,
            output_root: PathBuf::from("./captured_images"),
            timestamp_format: String::from("_%Y_%m_%d_%H_%M"),
            image_prefix: String::from("capture"),
            discovery: DiscoveryPolicy::default(),
        }
    }
}

impl ParameterSet {
    /// Read a parameter file. Fields missing from the file keep their
    /// defaults.
    ///
    /// * `filepath`: path to a yaml parameter file.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        let file = Path::new(&filepath);
        let parameters = config::Config::builder()
            .add_source(config::File::new(
                &file.to_string_lossy(),
                config::FileFormat::Yaml,
            ))
            .build()?
            .try_deserialize::<ParameterSet>()?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Reject values that can never produce a working session. Values the
    /// device has to judge (exposure, gain bounds) are left to the
    /// configuration step.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| -> Result<()> {
            Err(CaptureError::Config {
                source: config::ConfigError::Message(message),
            })
        };

        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return invalid(format!("frame_rate must be positive, got {}", self.frame_rate));
        }
        if !(self.exposure_time.is_finite() && self.exposure_time > 0.0) {
            return invalid(format!(
                "exposure_time must be positive, got {}",
                self.exposure_time
            ));
        }
        if self.binning < 1 {
            return invalid(format!("binning must be at least 1, got {}", self.binning));
        }
        if self.num_buffers == 0 || self.stream_buffer_count == 0 {
            return invalid(String::from("buffer counts must be at least 1"));
        }
        if Duration::try_from_secs_f64(self.discovery.interval_secs).is_err() {
            return invalid(format!(
                "discovery interval must be a non negative number of seconds, got {}",
                self.discovery.interval_secs
            ));
        }
        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return invalid(format!(
                "timestamp_format {:?} is not a valid strftime template",
                self.timestamp_format
            ));
        }
        Ok(())
    }

    /// Upper bound for a batch request.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Directory the images of a session started at `started` are written
    /// to, e.g. `./captured_images/_2024_05_01_09_30`.
    pub fn session_directory<Tz>(&self, started: &DateTime<Tz>) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        self.output_root
            .join(started.format(&self.timestamp_format).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_file_path;
    use chrono::Utc;
    use rstest::rstest;
    use serial_test::serial;
    use std::fs::OpenOptions;

    #[test]
    fn test_defaults_match_reference_constants() {
        let parameters = ParameterSet::default();
        assert_eq!(parameters.exposure_time, 10000.0);
        assert!(parameters.exposure_long);
        assert_eq!(parameters.pixel_format, PixelFormat::Mono8);
        assert_eq!(parameters.num_images, 10);
        assert_eq!(parameters.timeout(), Duration::from_millis(2000));
        assert_eq!(parameters.discovery.max_tries, 6);
        assert_eq!(parameters.discovery.interval(), Duration::from_secs(10));
        parameters.validate().expect("defaults are valid");
    }

    #[test]
    fn test_read_parameter_file() {
        let file = test_file_path!("/config/parameters.yaml");
        let parameters = ParameterSet::from_file(file).expect("Failed to parse parameter file");
        assert_eq!(parameters.pixel_format, PixelFormat::Mono8);
        assert_eq!(parameters.image_prefix, "capture");
        assert_eq!(parameters.frame_rate, 30.0);
        assert_eq!(parameters.discovery.max_tries, 6);
    }

    #[test]
    #[serial]
    /// Test writing parameters to a yaml file, and reading back to a type
    /// safe structure. Fields left out of a file keep their defaults.
    fn test_read_write_parameter_file() {
        let write_parameters = ParameterSet {
            exposure_time: 2500.0,
            exposure_long: false,
            pixel_format: PixelFormat::Mono12,
            binning: 2,
            num_buffers: 3,
            image_prefix: String::from("bench"),
            ..Default::default()
        };

        let path = format!(
            "{}/config/parameters_roundtrip.yaml",
            env!("CARGO_MANIFEST_DIR")
        );
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .expect("Failed to open file");
        serde_yaml::to_writer(file, &write_parameters).expect("Failed to write yaml");

        let read_parameters = ParameterSet::from_file(&path).expect("Failed to read yaml");
        assert_eq!(write_parameters, read_parameters);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let parameters = ParameterSet {
            frame_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            parameters.validate(),
            Err(CaptureError::Config { .. })
        ));

        let parameters = ParameterSet {
            timestamp_format: String::from("_%Q"),
            ..Default::default()
        };
        assert!(parameters.validate().is_err());
    }

    #[rstest]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(1.0e20)]
    fn test_unrepresentable_discovery_interval_is_rejected(#[case] interval_secs: f64) {
        let parameters = ParameterSet {
            discovery: DiscoveryPolicy {
                interval_secs,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            parameters.validate(),
            Err(CaptureError::Config { .. })
        ));
    }

    #[test]
    fn test_session_directory_is_timestamped() {
        let started = Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 30, 12)
            .single()
            .expect("valid date");
        let parameters = ParameterSet::default();
        assert_eq!(
            parameters.session_directory(&started),
            PathBuf::from("./captured_images/_2024_05_01_09_30")
        );
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let result = ParameterSet::from_file("/definitely/not/here.yaml");
        assert!(matches!(result, Err(CaptureError::Config { .. })));
    }
}
