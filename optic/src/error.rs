use crate::devices::hardware::camera::Setting;
use static_assertions::assert_impl_all;
use std::path::PathBuf;

/// Result type used across the acquisition components.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Everything that can go wrong between discovering a camera and
/// writing its frames to disk. Variants that concern a single camera
/// setting carry the node so the caller knows which step failed.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// Discovery came back empty for every attempt in the retry budget.
    #[error("no device found after {attempts} attempts, connect a device and run again")]
    NoDeviceFound {
        /// Number of discovery calls that were made.
        attempts: u32,
    },
    /// The device does not expose a capability the configuration needs.
    #[error("{setting} is not supported by the device: {reason}")]
    UnsupportedFeature {
        /// Node that is missing or incomplete.
        setting: Setting,
        /// What exactly was missing.
        reason: String,
    },
    /// Requested value lies outside the bounds reported by the node.
    #[error("{setting} value {value} is outside [{min}, {max}]")]
    ParameterOutOfRange {
        /// Node that rejected the value.
        setting: Setting,
        /// Requested value.
        value: f64,
        /// Node minimum.
        min: f64,
        /// Node maximum.
        max: f64,
    },
    /// The node exists but cannot be written in the current device state.
    #[error("{setting} is not writable")]
    ParameterNotWritable {
        /// Node that is locked.
        setting: Setting,
    },
    /// A combination of settings can never be satisfied by the device.
    #[error("{setting}: {reason}")]
    PreconditionViolation {
        /// Node whose value would break the precondition.
        setting: Setting,
        /// Human readable description of the violated relation.
        reason: String,
    },
    /// Payload does not match the geometry reported for the frame.
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),
    /// The frame layout cannot be written as a PNG.
    #[error("unsupported pixel format {pixel_format} with {bits_per_pixel} bits per pixel")]
    UnsupportedPixelFormat {
        /// GenICam name of the format.
        pixel_format: String,
        /// Bits per pixel reported by the buffer.
        bits_per_pixel: u32,
    },
    /// Encoding the PNG failed.
    #[error("failed to encode {path:?}: {source}")]
    Image {
        /// Target file.
        path: PathBuf,
        /// Codec error.
        #[source]
        source: image::ImageError,
    },
    /// Starting, reading or stopping the stream failed.
    #[error("stream error: {0}")]
    Stream(String),
    /// The parameter file could not be read or parsed.
    #[error("config error: {source}")]
    Config {
        /// Underlying loader error.
        #[from]
        source: config::ConfigError,
    },
    /// The camera SDK reported an error.
    #[error("backend error: {0}")]
    Backend(String),
    /// Filesystem failure.
    #[error("io error: {source}")]
    Io {
        /// Underlying error.
        #[from]
        source: std::io::Error,
    },
}

assert_impl_all!(CaptureError: Send, Sync);

impl CaptureError {
    /// Failures that only lose a single image. The capture loop logs these,
    /// requeues the buffer and carries on instead of tearing the stream down.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, CaptureError::Io { .. } | CaptureError::Image { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_failures_are_not_fatal() {
        let io = CaptureError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read only",
        ));
        assert!(io.is_persistence_failure());

        let stream = CaptureError::Stream(String::from("timeout"));
        assert!(!stream.is_persistence_failure());

        let invalid = CaptureError::InvalidBuffer(String::from("short payload"));
        assert!(!invalid.is_persistence_failure());
    }

    #[test]
    fn test_error_names_the_setting() {
        let err = CaptureError::ParameterNotWritable {
            setting: Setting::Gamma,
        };
        assert_eq!(err.to_string(), "Gamma is not writable");

        let err = CaptureError::ParameterOutOfRange {
            setting: Setting::Gain,
            value: 50.0,
            min: 0.0,
            max: 48.0,
        };
        assert_eq!(err.to_string(), "Gain value 50 is outside [0, 48]");
    }
}
