use crate::components::acquisition::parameters::ParameterSet;
use crate::devices::hardware::camera::{
    AutoMode, BinningAxis, BinningMode, BinningSelector, NodeMap, NumericNode, Setting,
};
use crate::error::{CaptureError, Result};
use tracing::{debug, info, warn};

/// Values the device ended up with after [`apply_configuration`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AppliedConfiguration {
    /// Exposure time written to the device, microseconds.
    pub exposure_time: f64,
    /// Frame rate written in long exposure mode.
    pub frame_rate: Option<f64>,
    /// Image width after binning.
    pub width: i64,
    /// Image height after binning.
    pub height: i64,
}

/// Write every camera setting of `parameters` to the device. The order is
/// fixed because GenICam nodes form a dependency graph: binning changes the
/// valid width/height range, and the frame rate bounds the exposure.
///
/// * `device`: node-map of the opened camera.
/// * `parameters`: session parameters.
pub fn apply_configuration<N>(device: &mut N, parameters: &ParameterSet) -> Result<AppliedConfiguration>
where
    N: NodeMap + ?Sized,
{
    info!("Start setting =================");
    let (exposure_time, frame_rate) = if parameters.exposure_long {
        let exposure_time = set_exposure_long(device, parameters.exposure_time, parameters.frame_rate)?;
        (exposure_time, Some(parameters.frame_rate))
    } else {
        (set_exposure(device, parameters.exposure_time)?, None)
    };
    set_binning(device, parameters.binning)?;
    set_gain(device, parameters.gain)?;
    set_pixel_format(device, parameters)?;
    let (width, height) = set_width_height(device)?;
    set_gamma(device, parameters.gamma)?;
    info!("End setting ===================");

    Ok(AppliedConfiguration {
        exposure_time,
        frame_rate,
        width,
        height,
    })
}

/// Log the acquisition mode and image size found on the device before it
/// is reconfigured.
pub fn log_initial_values<N: NodeMap + ?Sized>(device: &N) -> Result<()> {
    info!("initial acquisition mode : {}", device.acquisition_mode()?);
    info!("initial width : {}", device.width()?.value);
    info!("initial height : {}", device.height()?.value);
    Ok(())
}

fn require_writable(setting: Setting, writable: bool) -> Result<()> {
    if writable {
        Ok(())
    } else {
        Err(CaptureError::ParameterNotWritable { setting })
    }
}

fn require_in_range(setting: Setting, value: f64, node: &NumericNode<f64>) -> Result<()> {
    if node.contains(value) {
        Ok(())
    } else {
        Err(CaptureError::ParameterOutOfRange {
            setting,
            value,
            min: node.min,
            max: node.max,
        })
    }
}

/// Short exposure: clamp the request into the bounds the device currently
/// allows. Returns the value that was written.
pub fn set_exposure<N: NodeMap + ?Sized>(device: &mut N, exposure_time: f64) -> Result<f64> {
    device.set_exposure_auto(AutoMode::Off)?;
    info!("Disable auto exposure");

    let node = device.exposure_time()?;
    require_writable(Setting::ExposureTime, node.writable)?;

    let value = if exposure_time > node.max {
        warn!(
            "Exposure time {exposure_time} us is over the maximum {} us, try exposure_long",
            node.max
        );
        node.max
    } else if exposure_time < node.min {
        warn!(
            "Exposure time {exposure_time} us is less than the minimum {} us",
            node.min
        );
        node.min
    } else {
        exposure_time
    };
    device.set_exposure_time(value)?;
    info!("Exposure time set to {value} us");
    Ok(value)
}

/// Long exposure: lower the frame rate so the exposure fits in one frame
/// period. Nothing is written when the exposure can not fit.
///
/// * `exposure_time`: requested exposure, microseconds.
/// * `frame_rate`: frame rate to run at, Hz.
pub fn set_exposure_long<N: NodeMap + ?Sized>(
    device: &mut N,
    exposure_time: f64,
    frame_rate: f64,
) -> Result<f64> {
    let frame_period = 1.0 / frame_rate;
    let exposure_secs = exposure_time * 1e-6;
    if !(frame_rate > 0.0 && frame_period > exposure_secs) {
        return Err(CaptureError::PreconditionViolation {
            setting: Setting::ExposureTime,
            reason: format!(
                "exposure of {exposure_secs:.6} s does not fit in the allowable \
                 {frame_period:.6} s frame period at {frame_rate} Hz, lower the exposure time"
            ),
        });
    }

    device.set_frame_rate_enable(true)?;
    let frame_rate_node = device.frame_rate()?;
    require_writable(Setting::AcquisitionFrameRate, frame_rate_node.writable)?;
    require_in_range(Setting::AcquisitionFrameRate, frame_rate, &frame_rate_node)?;
    device.set_frame_rate(frame_rate)?;

    device.set_exposure_auto(AutoMode::Off)?;
    info!("Disable auto exposure");

    // Bounds are only valid once the new frame rate is in place.
    let node = device.exposure_time()?;
    require_writable(Setting::ExposureTime, node.writable)?;
    require_in_range(Setting::ExposureTime, exposure_time, &node)?;
    device.set_exposure_time(exposure_time)?;

    info!("Acquisition frame rate set to {frame_rate} Hz and exposure to {exposure_time} us");
    Ok(exposure_time)
}

/// Digital binning with summed pixels on both axes.
pub fn set_binning<N: NodeMap + ?Sized>(device: &mut N, binning: i64) -> Result<()> {
    info!("Checking if digital binning is supported");
    let selector = device.binning_selector()?;
    let digital: &'static str = BinningSelector::Digital.into();
    if !selector.has_readable_entry(digital) {
        return Err(CaptureError::UnsupportedFeature {
            setting: Setting::BinningSelector,
            reason: String::from("digital binning is not available from BinningSelector"),
        });
    }
    require_writable(Setting::BinningSelector, selector.writable)?;
    device.set_binning_selector(BinningSelector::Digital)?;

    let horizontal = device.binning(BinningAxis::Horizontal)?;
    let vertical = device.binning(BinningAxis::Vertical)?;
    for (axis, node) in [(BinningAxis::Vertical, &vertical), (BinningAxis::Horizontal, &horizontal)] {
        if !node.writable {
            return Err(CaptureError::UnsupportedFeature {
                setting: axis.factor_setting(),
                reason: String::from("binning factor can not be written"),
            });
        }
    }

    info!("Set binning mode to {}", BinningMode::Sum);
    device.set_binning_mode(BinningAxis::Vertical, BinningMode::Sum)?;
    device.set_binning_mode(BinningAxis::Horizontal, BinningMode::Sum)?;

    for (axis, node) in [(BinningAxis::Horizontal, &horizontal), (BinningAxis::Vertical, &vertical)] {
        if !node.contains(binning) {
            return Err(CaptureError::ParameterOutOfRange {
                setting: axis.factor_setting(),
                value: binning as f64,
                min: node.min as f64,
                max: node.max as f64,
            });
        }
    }
    info!("Set horizontal and vertical binning value {binning}");
    device.set_binning(BinningAxis::Horizontal, binning)?;
    device.set_binning(BinningAxis::Vertical, binning)?;
    Ok(())
}

/// Manual gain.
pub fn set_gain<N: NodeMap + ?Sized>(device: &mut N, gain: f64) -> Result<()> {
    device.set_gain_auto(AutoMode::Off)?;

    let node = device.gain()?;
    require_writable(Setting::Gain, node.writable)?;
    require_in_range(Setting::Gain, gain, &node)?;

    info!("Set gain to value : {gain}");
    device.set_gain(gain)
}

/// Pixel format, which must be one the device offers.
pub fn set_pixel_format<N: NodeMap + ?Sized>(device: &mut N, parameters: &ParameterSet) -> Result<()> {
    let format = parameters.pixel_format;
    let node = device.pixel_format()?;
    require_writable(Setting::PixelFormat, node.writable)?;
    let name: &'static str = format.into();
    if !node.has_readable_entry(name) {
        return Err(CaptureError::UnsupportedFeature {
            setting: Setting::PixelFormat,
            reason: format!("{name} is not offered by the device"),
        });
    }

    info!("Setting pixel format to {format}");
    device.set_pixel_format(format)
}

/// Drive width and height to their maxima, undoing any region of interest
/// left by an earlier session.
pub fn set_width_height<N: NodeMap + ?Sized>(device: &mut N) -> Result<(i64, i64)> {
    let width = device.width()?;
    require_writable(Setting::Width, width.writable)?;
    info!("Setting width to its maximum value {}", width.max);
    device.set_width(width.max)?;

    let height = device.height()?;
    require_writable(Setting::Height, height.writable)?;
    info!("Setting height to its maximum value {}", height.max);
    device.set_height(height.max)?;

    Ok((width.max, height.max))
}

/// Gamma correction.
pub fn set_gamma<N: NodeMap + ?Sized>(device: &mut N, gamma: f64) -> Result<()> {
    let node = device.gamma()?;
    require_writable(Setting::Gamma, node.writable)?;
    require_in_range(Setting::Gamma, gamma, &node)?;

    info!("Setting gamma to {gamma}");
    device.set_gamma(gamma)?;
    debug!("Gamma node now {:?}", device.gamma()?);
    Ok(())
}
