use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, time::Duration};
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

/// GenICam nodes touched by the acquisition components. The variant names
/// are the standard feature names so they can be used directly as node-map
/// keys by a backend.
#[derive(StrumDisplay, EnumString, IntoStaticStr, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Setting {
    /// Automatic exposure control.
    ExposureAuto,
    /// Exposure time in microseconds.
    ExposureTime,
    /// Gate for manual frame rate control.
    AcquisitionFrameRateEnable,
    /// Frame rate in Hz.
    AcquisitionFrameRate,
    /// Current acquisition mode (continuous, single frame, ...).
    AcquisitionMode,
    /// Chooses which binning engine the binning nodes refer to.
    BinningSelector,
    /// Vertical binning factor.
    BinningVertical,
    /// Horizontal binning factor.
    BinningHorizontal,
    /// Sum or average for the vertical axis.
    BinningVerticalMode,
    /// Sum or average for the horizontal axis.
    BinningHorizontalMode,
    /// Automatic gain control.
    GainAuto,
    /// Analog gain in dB.
    Gain,
    /// Pixel layout delivered in the payload.
    PixelFormat,
    /// Image width in pixels.
    Width,
    /// Image height in pixels.
    Height,
    /// Gamma correction.
    Gamma,
    /// Stream buffer delivery policy.
    StreamBufferHandlingMode,
    /// Negotiate the largest transport packet the link allows.
    StreamAutoNegotiatePacketSize,
    /// Ask the device to resend lost transport packets.
    StreamPacketResendEnable,
}

/// Pixel formats that the persistence layer knows how to write. Names
/// follow the GenICam standard feature naming convention (SFNC).
#[derive(
    EnumString,
    IntoStaticStr,
    StrumDisplay,
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
)]
pub enum PixelFormat {
    /// 8 bit monochrome.
    Mono8,
    /// 10 bit monochrome, unpacked into 16 bit words.
    Mono10,
    /// 12 bit monochrome, unpacked into 16 bit words.
    Mono12,
    /// 16 bit monochrome.
    Mono16,
    /// 8 bit raw bayer, red first.
    BayerRG8,
    /// 24 bit packed RGB.
    RGB8,
}

impl PixelFormat {
    /// Size of a single pixel in the payload.
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRG8 => 8,
            PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => 16,
            PixelFormat::RGB8 => 24,
        }
    }
}

/// Automatic control mode shared by exposure and gain.
#[derive(EnumString, IntoStaticStr, StrumDisplay, Copy, Clone, Debug, PartialEq, Eq)]
pub enum AutoMode {
    /// Manual control.
    Off,
    /// Adjust once then hold.
    Once,
    /// Keep adjusting.
    Continuous,
}

/// Which binning engine the binning nodes address.
#[derive(EnumString, IntoStaticStr, StrumDisplay, Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinningSelector {
    /// Binning in the readout logic.
    Digital,
    /// Binning on the sensor.
    Sensor,
}

/// How binned pixels are combined.
#[derive(EnumString, IntoStaticStr, StrumDisplay, Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinningMode {
    /// Add the pixel values.
    Sum,
    /// Average the pixel values.
    Average,
}

/// Binning axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinningAxis {
    /// Columns.
    Horizontal,
    /// Rows.
    Vertical,
}

impl BinningAxis {
    /// Node holding the binning factor for this axis.
    pub fn factor_setting(&self) -> Setting {
        match self {
            BinningAxis::Horizontal => Setting::BinningHorizontal,
            BinningAxis::Vertical => Setting::BinningVertical,
        }
    }

    /// Node holding the binning mode for this axis.
    pub fn mode_setting(&self) -> Setting {
        match self {
            BinningAxis::Horizontal => Setting::BinningHorizontalMode,
            BinningAxis::Vertical => Setting::BinningVerticalMode,
        }
    }
}

/// Order and behaviour of buffers inside the stream engine.
#[derive(EnumString, IntoStaticStr, StrumDisplay, Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum BufferHandlingMode {
    /// Deliver every frame in arrival order.
    #[default]
    OldestFirst,
    /// Deliver in arrival order, overwrite the oldest when the pool is full.
    OldestFirstOverwrite,
    /// Drop older unread frames, only deliver the most recent one.
    NewestOnly,
}

/// Snapshot of a bounded numeric node. The device can change the bounds
/// whenever a dependent node is written, so re-read it after such writes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NumericNode<T> {
    /// Current value.
    pub value: T,
    /// Smallest accepted value.
    pub min: T,
    /// Largest accepted value.
    pub max: T,
    /// Whether a write is accepted right now.
    pub writable: bool,
}

impl<T: PartialOrd + Copy> NumericNode<T> {
    /// True when `value` lies within the node bounds.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// One selectable value of an enumeration node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumEntry {
    /// Entry name, e.g. `Digital`.
    pub name: String,
    /// Entries can be listed but unavailable on a given model.
    pub readable: bool,
}

/// Snapshot of an enumeration node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumNode {
    /// Name of the active entry.
    pub value: String,
    /// All entries the node lists.
    pub entries: Vec<EnumEntry>,
    /// Whether a write is accepted right now.
    pub writable: bool,
}

impl EnumNode {
    /// True when the node lists `name` and the entry is readable.
    pub fn has_readable_entry(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.name == name && entry.readable)
    }
}

/// Identification of a discovered camera.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Transport level id used to open the device.
    pub id: String,
    /// Manufacturer.
    pub vendor: String,
    /// Model name.
    pub model: String,
    /// Serial number.
    pub serial: String,
    /// Network address, when the transport has one.
    pub address: Option<String>,
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} (serial {}", self.vendor, self.model, self.serial)?;
        if let Some(address) = &self.address {
            write!(f, ", {address}")?;
        }
        write!(f, ")")
    }
}

/// A frame leased from a stream. It deliberately does not implement
/// `Clone`: it has to be handed back to the stream it came from through
/// [`CaptureStream::requeue_buffer`], which consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Buffer {
    /// Frame counter assigned by the stream.
    pub frame_id: u64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bits per pixel, all channels included.
    pub bits_per_pixel: u32,
    /// Layout of the pixel data.
    pub pixel_format: PixelFormat,
    /// Set when chunk data trails the pixel payload.
    pub has_chunk_data: bool,
    /// Raw payload.
    pub data: Vec<u8>,
}

impl Buffer {
    /// Number of payload bytes that hold pixels.
    pub fn image_size_in_bytes(&self) -> usize {
        let bytes_per_pixel = (self.bits_per_pixel / 8) as usize;
        self.height as usize * self.width as usize * bytes_per_pixel
    }

    /// Pixel bytes of the payload with any trailing chunk data cut off.
    pub fn pixel_data(&self) -> Result<&[u8]> {
        let image_size = self.image_size_in_bytes();
        if self.has_chunk_data {
            self.data.get(..image_size).ok_or_else(|| {
                CaptureError::InvalidBuffer(format!(
                    "frame {} has {} bytes, {}x{} at {} bpp needs {}",
                    self.frame_id,
                    self.data.len(),
                    self.width,
                    self.height,
                    self.bits_per_pixel,
                    image_size
                ))
            })
        } else if self.data.len() == image_size {
            Ok(&self.data)
        } else {
            Err(CaptureError::InvalidBuffer(format!(
                "frame {} has {} bytes without chunk data, {}x{} at {} bpp needs exactly {}",
                self.frame_id,
                self.data.len(),
                self.width,
                self.height,
                self.bits_per_pixel,
                image_size
            )))
        }
    }
}

/// Exposure and the frame rate it depends on.
pub trait ExposureControl {
    /// Switch automatic exposure.
    fn set_exposure_auto(&mut self, mode: AutoMode) -> Result<()>;
    /// Exposure time node, microseconds.
    fn exposure_time(&self) -> Result<NumericNode<f64>>;
    /// Write the exposure time, microseconds.
    fn set_exposure_time(&mut self, micros: f64) -> Result<()>;
    /// Enable manual frame rate control.
    fn set_frame_rate_enable(&mut self, enable: bool) -> Result<()>;
    /// Frame rate node, Hz.
    fn frame_rate(&self) -> Result<NumericNode<f64>>;
    /// Write the frame rate, Hz.
    fn set_frame_rate(&mut self, hz: f64) -> Result<()>;
}

/// Binning engine selection and per axis factor/mode nodes.
pub trait BinningControl {
    /// Binning selector node.
    fn binning_selector(&self) -> Result<EnumNode>;
    /// Select the binning engine.
    fn set_binning_selector(&mut self, selector: BinningSelector) -> Result<()>;
    /// Binning factor node for `axis`.
    fn binning(&self, axis: BinningAxis) -> Result<NumericNode<i64>>;
    /// Binning mode for `axis`. Must be written before the factor.
    fn set_binning_mode(&mut self, axis: BinningAxis, mode: BinningMode) -> Result<()>;
    /// Binning factor for `axis`.
    fn set_binning(&mut self, axis: BinningAxis, factor: i64) -> Result<()>;
}

/// Gain.
pub trait GainControl {
    /// Switch automatic gain.
    fn set_gain_auto(&mut self, mode: AutoMode) -> Result<()>;
    /// Gain node.
    fn gain(&self) -> Result<NumericNode<f64>>;
    /// Write the gain.
    fn set_gain(&mut self, gain: f64) -> Result<()>;
}

/// Image geometry, pixel format and tone mapping.
pub trait ImageFormatControl {
    /// Current acquisition mode entry.
    fn acquisition_mode(&self) -> Result<String>;
    /// Pixel format node.
    fn pixel_format(&self) -> Result<EnumNode>;
    /// Write the pixel format.
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()>;
    /// Width node.
    fn width(&self) -> Result<NumericNode<i64>>;
    /// Write the width.
    fn set_width(&mut self, width: i64) -> Result<()>;
    /// Height node.
    fn height(&self) -> Result<NumericNode<i64>>;
    /// Write the height.
    fn set_height(&mut self, height: i64) -> Result<()>;
    /// Gamma node.
    fn gamma(&self) -> Result<NumericNode<f64>>;
    /// Write gamma.
    fn set_gamma(&mut self, gamma: f64) -> Result<()>;
}

/// Every device setting the configuration applier writes.
pub trait NodeMap: ExposureControl + BinningControl + GainControl + ImageFormatControl {}

impl<T> NodeMap for T where T: ExposureControl + BinningControl + GainControl + ImageFormatControl {}

/// Transport layer options of the stream. These only take effect when the
/// stream is started.
pub trait StreamNodeMap {
    /// Buffer delivery policy.
    fn set_buffer_handling_mode(&mut self, mode: BufferHandlingMode) -> Result<()>;
    /// Negotiate the packet size with the host.
    fn set_auto_negotiate_packet_size(&mut self, enable: bool) -> Result<()>;
    /// Request retransmission of lost packets.
    fn set_packet_resend(&mut self, enable: bool) -> Result<()>;
}

/// Stream options held by a device until its stream is started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StreamSettings {
    /// Buffer delivery policy.
    pub buffer_handling_mode: BufferHandlingMode,
    /// Negotiate the packet size with the host.
    pub auto_negotiate_packet_size: bool,
    /// Request retransmission of lost packets.
    pub packet_resend: bool,
}

impl StreamNodeMap for StreamSettings {
    fn set_buffer_handling_mode(&mut self, mode: BufferHandlingMode) -> Result<()> {
        self.buffer_handling_mode = mode;
        Ok(())
    }

    fn set_auto_negotiate_packet_size(&mut self, enable: bool) -> Result<()> {
        self.auto_negotiate_packet_size = enable;
        Ok(())
    }

    fn set_packet_resend(&mut self, enable: bool) -> Result<()> {
        self.packet_resend = enable;
        Ok(())
    }
}

/// A connected camera. Starting a stream borrows the device mutably, so
/// neither the node-map nor the stream options can be touched while the
/// stream is live.
pub trait CameraDevice: NodeMap {
    /// Stream type handed out by [`CameraDevice::start_stream`].
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Identification of the device.
    fn info(&self) -> &DeviceInfo;

    /// Stream options applied on the next stream start.
    fn stream_node_map(&mut self) -> &mut StreamSettings;

    /// Start acquisition with a pool of `buffer_count` buffers.
    fn start_stream(&mut self, buffer_count: usize) -> Result<Self::Stream<'_>>;
}

/// A running acquisition.
pub trait CaptureStream {
    /// Block until the next buffer is available.
    fn get_buffer(&mut self) -> Result<Buffer>;

    /// Block until `count` buffers are available or `timeout` elapses.
    fn get_buffers(&mut self, count: usize, timeout: Duration) -> Result<Vec<Buffer>>;

    /// Hand a buffer back to the pool.
    fn requeue_buffer(&mut self, buffer: Buffer) -> Result<()>;

    /// Hand a batch of buffers back to the pool in one call.
    fn requeue_buffers(&mut self, buffers: Vec<Buffer>) -> Result<()>;

    /// Stop acquisition and release the pool.
    fn stop(self) -> Result<()>;
}

/// Entry point of a camera SDK.
pub trait DeviceSystem {
    /// Device type created by the system.
    type Device: CameraDevice;

    /// Open every reachable device. An empty list is not an error.
    fn create_devices(&mut self) -> Result<Vec<Self::Device>>;

    /// Release a device created by [`DeviceSystem::create_devices`].
    fn destroy_device(&mut self, device: Self::Device) -> Result<()>;
}
