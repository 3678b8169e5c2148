use crate::devices::hardware::camera::{
    AutoMode, BinningAxis, BinningControl, BinningMode, BinningSelector, Buffer, CameraDevice,
    CaptureStream, DeviceInfo, DeviceSystem, EnumEntry, EnumNode, ExposureControl, GainControl,
    ImageFormatControl, NumericNode, PixelFormat, Setting, StreamSettings,
};
use crate::error::{CaptureError, Result};
use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

/// Value written to a simulated node, recorded in write order.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeValue {
    /// Float node.
    Float(f64),
    /// Integer node.
    Integer(i64),
    /// Boolean node.
    Boolean(bool),
    /// Enumeration entry.
    Entry(String),
}

/// Stream activity observed by a simulated camera over its lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamLog {
    /// Pool size of every started stream.
    pub started: Vec<usize>,
    /// Settings in force at each stream start.
    pub settings: Vec<StreamSettings>,
    /// Number of buffers handed out.
    pub delivered: u64,
    /// Size of every requeue call, one entry per call.
    pub requeue_calls: Vec<usize>,
    /// Number of stream stops.
    pub stopped: u32,
}

impl StreamLog {
    /// Buffers returned over all requeue calls.
    pub fn requeued(&self) -> usize {
        self.requeue_calls.iter().sum()
    }
}

/// In-memory camera with a small GenICam style node table. Dependent nodes
/// behave like they do on real devices: the exposure maximum follows the
/// frame rate, width/height maxima follow the binning factors, and manual
/// exposure/gain are locked while their auto node is not `Off`.
#[derive(Clone, Debug)]
pub struct SimulatedCamera {
    info: DeviceInfo,
    floats: HashMap<Setting, NumericNode<f64>>,
    integers: HashMap<Setting, NumericNode<i64>>,
    enums: HashMap<Setting, EnumNode>,
    booleans: HashMap<Setting, bool>,
    read_only: HashSet<Setting>,
    sensor_width: i64,
    sensor_height: i64,
    chunk_bytes: usize,
    fail_after: Option<u64>,
    stream_settings: StreamSettings,
    journal: Vec<(Setting, NodeValue)>,
    stream_log: StreamLog,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

fn float_node(value: f64, min: f64, max: f64) -> NumericNode<f64> {
    NumericNode {
        value,
        min,
        max,
        writable: true,
    }
}

fn integer_node(value: i64, min: i64, max: i64) -> NumericNode<i64> {
    NumericNode {
        value,
        min,
        max,
        writable: true,
    }
}

fn enum_node(value: &str, entries: &[&str]) -> EnumNode {
    EnumNode {
        value: value.to_string(),
        entries: entries
            .iter()
            .map(|name| EnumEntry {
                name: name.to_string(),
                readable: true,
            })
            .collect(),
        writable: true,
    }
}

impl SimulatedCamera {
    /// A 1440x1080 monochrome camera running at 30 Hz with a cropped
    /// region of interest left over from a previous session.
    pub fn new() -> Self {
        let floats = HashMap::from([
            (Setting::ExposureTime, float_node(5000.0, 20.0, 1.0e6 / 30.0)),
            (Setting::AcquisitionFrameRate, float_node(30.0, 1.0, 60.0)),
            (Setting::Gain, float_node(0.0, 0.0, 48.0)),
            (Setting::Gamma, float_node(0.5, 0.2, 2.0)),
        ]);
        let integers = HashMap::from([
            (Setting::Width, integer_node(640, 16, 1440)),
            (Setting::Height, integer_node(480, 16, 1080)),
            (Setting::BinningHorizontal, integer_node(1, 1, 4)),
            (Setting::BinningVertical, integer_node(1, 1, 4)),
        ]);
        let enums = HashMap::from([
            (
                Setting::ExposureAuto,
                enum_node("Continuous", &["Off", "Once", "Continuous"]),
            ),
            (
                Setting::GainAuto,
                enum_node("Continuous", &["Off", "Once", "Continuous"]),
            ),
            (
                Setting::BinningSelector,
                enum_node("Sensor", &["Sensor", "Digital"]),
            ),
            (
                Setting::BinningHorizontalMode,
                enum_node("Average", &["Sum", "Average"]),
            ),
            (
                Setting::BinningVerticalMode,
                enum_node("Average", &["Sum", "Average"]),
            ),
            (
                Setting::PixelFormat,
                enum_node("Mono8", &["Mono8", "Mono12", "Mono16"]),
            ),
            (
                Setting::AcquisitionMode,
                enum_node("Continuous", &["Continuous", "SingleFrame", "MultiFrame"]),
            ),
        ]);
        let booleans = HashMap::from([(Setting::AcquisitionFrameRateEnable, false)]);

        Self {
            info: DeviceInfo {
                id: String::from("Simulated-0001"),
                vendor: String::from("Simulated"),
                model: String::from("SIM-1440M"),
                serial: String::from("0001"),
                address: Some(String::from("127.0.0.1")),
            },
            floats,
            integers,
            enums,
            booleans,
            read_only: HashSet::new(),
            sensor_width: 1440,
            sensor_height: 1080,
            chunk_bytes: 0,
            fail_after: None,
            stream_settings: StreamSettings::default(),
            journal: Vec::new(),
            stream_log: StreamLog::default(),
        }
    }

    /// Replace the identification of the camera.
    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    /// Replace the sensor resolution. The region of interest is reset to
    /// the full sensor.
    pub fn with_sensor(mut self, width: i64, height: i64) -> Self {
        self.sensor_width = width;
        self.sensor_height = height;
        self.integers
            .insert(Setting::Width, integer_node(width, 1, width));
        self.integers
            .insert(Setting::Height, integer_node(height, 1, height));
        self.refresh_dependent_bounds();
        self
    }

    /// Lock a node so any write fails and its snapshot reports read only.
    pub fn with_read_only(mut self, setting: Setting) -> Self {
        self.read_only.insert(setting);
        self
    }

    /// Replace the bounds of a float node.
    pub fn with_float_bounds(mut self, setting: Setting, min: f64, max: f64) -> Self {
        if let Some(node) = self.floats.get_mut(&setting) {
            node.min = min;
            node.max = max;
            node.value = node.value.clamp(min, max);
        }
        self
    }

    /// Replace the entries of an enumeration node.
    pub fn with_entries(mut self, setting: Setting, entries: Vec<EnumEntry>) -> Self {
        if let Some(node) = self.enums.get_mut(&setting) {
            node.entries = entries;
        }
        self
    }

    /// Append `bytes` of chunk data to every frame.
    pub fn with_chunk_data(mut self, bytes: usize) -> Self {
        self.chunk_bytes = bytes;
        self
    }

    /// Fail buffer retrieval once `frames` buffers were delivered.
    pub fn with_failure_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Every node write in the order it happened.
    pub fn journal(&self) -> &[(Setting, NodeValue)] {
        &self.journal
    }

    /// Position of the first write to `setting` in the journal.
    pub fn first_write(&self, setting: Setting) -> Option<usize> {
        self.journal.iter().position(|(s, _)| *s == setting)
    }

    /// Stream activity so far.
    pub fn stream_log(&self) -> &StreamLog {
        &self.stream_log
    }

    /// Current value of a float node.
    pub fn float_value(&self, setting: Setting) -> Option<f64> {
        self.floats.get(&setting).map(|node| node.value)
    }

    /// Current value of an integer node.
    pub fn integer_value(&self, setting: Setting) -> Option<i64> {
        self.integers.get(&setting).map(|node| node.value)
    }

    /// Current entry of an enumeration node.
    pub fn entry_value(&self, setting: Setting) -> Option<&str> {
        self.enums.get(&setting).map(|node| node.value.as_str())
    }

    /// Current value of a boolean node.
    pub fn boolean_value(&self, setting: Setting) -> Option<bool> {
        self.booleans.get(&setting).copied()
    }

    fn is_locked(&self, setting: Setting) -> bool {
        if self.read_only.contains(&setting) {
            return true;
        }
        match setting {
            Setting::ExposureTime => self.entry_value(Setting::ExposureAuto) != Some("Off"),
            Setting::Gain => self.entry_value(Setting::GainAuto) != Some("Off"),
            Setting::AcquisitionFrameRate => {
                self.boolean_value(Setting::AcquisitionFrameRateEnable) != Some(true)
            }
            _ => false,
        }
    }

    fn float(&self, setting: Setting) -> Result<NumericNode<f64>> {
        let mut node = *self.floats.get(&setting).ok_or_else(|| missing(setting))?;
        node.writable = !self.is_locked(setting);
        Ok(node)
    }

    fn integer(&self, setting: Setting) -> Result<NumericNode<i64>> {
        let mut node = *self.integers.get(&setting).ok_or_else(|| missing(setting))?;
        node.writable = !self.is_locked(setting);
        Ok(node)
    }

    fn enumeration(&self, setting: Setting) -> Result<EnumNode> {
        let mut node = self.enums.get(&setting).ok_or_else(|| missing(setting))?.clone();
        node.writable = !self.is_locked(setting);
        Ok(node)
    }

    fn write_float(&mut self, setting: Setting, value: f64) -> Result<()> {
        let node = self.float(setting)?;
        check_write(setting, node.writable)?;
        if !node.contains(value) {
            return Err(CaptureError::ParameterOutOfRange {
                setting,
                value,
                min: node.min,
                max: node.max,
            });
        }
        if let Some(node) = self.floats.get_mut(&setting) {
            node.value = value;
        }
        self.record(setting, NodeValue::Float(value));
        self.refresh_dependent_bounds();
        Ok(())
    }

    fn write_integer(&mut self, setting: Setting, value: i64) -> Result<()> {
        let node = self.integer(setting)?;
        check_write(setting, node.writable)?;
        if !node.contains(value) {
            return Err(CaptureError::ParameterOutOfRange {
                setting,
                value: value as f64,
                min: node.min as f64,
                max: node.max as f64,
            });
        }
        if let Some(node) = self.integers.get_mut(&setting) {
            node.value = value;
        }
        self.record(setting, NodeValue::Integer(value));
        self.refresh_dependent_bounds();
        Ok(())
    }

    fn write_entry(&mut self, setting: Setting, entry: &str) -> Result<()> {
        let node = self.enumeration(setting)?;
        check_write(setting, node.writable)?;
        if !node.has_readable_entry(entry) {
            return Err(CaptureError::UnsupportedFeature {
                setting,
                reason: format!("no entry named {entry}"),
            });
        }
        if let Some(node) = self.enums.get_mut(&setting) {
            node.value = entry.to_string();
        }
        self.record(setting, NodeValue::Entry(entry.to_string()));
        Ok(())
    }

    fn write_boolean(&mut self, setting: Setting, value: bool) -> Result<()> {
        check_write(setting, !self.is_locked(setting))?;
        self.booleans.insert(setting, value);
        self.record(setting, NodeValue::Boolean(value));
        Ok(())
    }

    fn record(&mut self, setting: Setting, value: NodeValue) {
        debug!("simulated write {setting} = {value:?}");
        self.journal.push((setting, value));
    }

    /// Exposure can not exceed one frame period, and the image can not be
    /// larger than the binned sensor.
    fn refresh_dependent_bounds(&mut self) {
        let frame_rate = self
            .floats
            .get(&Setting::AcquisitionFrameRate)
            .map_or(30.0, |node| node.value);
        if let Some(exposure) = self.floats.get_mut(&Setting::ExposureTime) {
            exposure.max = 1.0e6 / frame_rate;
            exposure.value = exposure.value.min(exposure.max);
        }

        let horizontal = self.integer_value(Setting::BinningHorizontal).unwrap_or(1);
        let vertical = self.integer_value(Setting::BinningVertical).unwrap_or(1);
        let width_max = self.sensor_width / horizontal.max(1);
        let height_max = self.sensor_height / vertical.max(1);
        if let Some(width) = self.integers.get_mut(&Setting::Width) {
            width.max = width_max;
            width.value = width.value.min(width_max);
        }
        if let Some(height) = self.integers.get_mut(&Setting::Height) {
            height.max = height_max;
            height.value = height.value.min(height_max);
        }
    }

    fn current_pixel_format(&self) -> Result<PixelFormat> {
        let name = self
            .entry_value(Setting::PixelFormat)
            .ok_or_else(|| missing(Setting::PixelFormat))?;
        PixelFormat::from_str(name).map_err(|_| CaptureError::UnsupportedPixelFormat {
            pixel_format: name.to_string(),
            bits_per_pixel: 0,
        })
    }
}

fn missing(setting: Setting) -> CaptureError {
    CaptureError::UnsupportedFeature {
        setting,
        reason: String::from("node not present on the simulated device"),
    }
}

fn check_write(setting: Setting, writable: bool) -> Result<()> {
    if writable {
        Ok(())
    } else {
        Err(CaptureError::ParameterNotWritable { setting })
    }
}

impl ExposureControl for SimulatedCamera {
    fn set_exposure_auto(&mut self, mode: AutoMode) -> Result<()> {
        self.write_entry(Setting::ExposureAuto, mode.into())
    }

    fn exposure_time(&self) -> Result<NumericNode<f64>> {
        self.float(Setting::ExposureTime)
    }

    fn set_exposure_time(&mut self, micros: f64) -> Result<()> {
        self.write_float(Setting::ExposureTime, micros)
    }

    fn set_frame_rate_enable(&mut self, enable: bool) -> Result<()> {
        self.write_boolean(Setting::AcquisitionFrameRateEnable, enable)
    }

    fn frame_rate(&self) -> Result<NumericNode<f64>> {
        self.float(Setting::AcquisitionFrameRate)
    }

    fn set_frame_rate(&mut self, hz: f64) -> Result<()> {
        self.write_float(Setting::AcquisitionFrameRate, hz)
    }
}

impl BinningControl for SimulatedCamera {
    fn binning_selector(&self) -> Result<EnumNode> {
        self.enumeration(Setting::BinningSelector)
    }

    fn set_binning_selector(&mut self, selector: BinningSelector) -> Result<()> {
        self.write_entry(Setting::BinningSelector, selector.into())
    }

    fn binning(&self, axis: BinningAxis) -> Result<NumericNode<i64>> {
        self.integer(axis.factor_setting())
    }

    fn set_binning_mode(&mut self, axis: BinningAxis, mode: BinningMode) -> Result<()> {
        self.write_entry(axis.mode_setting(), mode.into())
    }

    fn set_binning(&mut self, axis: BinningAxis, factor: i64) -> Result<()> {
        self.write_integer(axis.factor_setting(), factor)
    }
}

impl GainControl for SimulatedCamera {
    fn set_gain_auto(&mut self, mode: AutoMode) -> Result<()> {
        self.write_entry(Setting::GainAuto, mode.into())
    }

    fn gain(&self) -> Result<NumericNode<f64>> {
        self.float(Setting::Gain)
    }

    fn set_gain(&mut self, gain: f64) -> Result<()> {
        self.write_float(Setting::Gain, gain)
    }
}

impl ImageFormatControl for SimulatedCamera {
    fn acquisition_mode(&self) -> Result<String> {
        Ok(self.enumeration(Setting::AcquisitionMode)?.value)
    }

    fn pixel_format(&self) -> Result<EnumNode> {
        self.enumeration(Setting::PixelFormat)
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        self.write_entry(Setting::PixelFormat, format.into())
    }

    fn width(&self) -> Result<NumericNode<i64>> {
        self.integer(Setting::Width)
    }

    fn set_width(&mut self, width: i64) -> Result<()> {
        self.write_integer(Setting::Width, width)
    }

    fn height(&self) -> Result<NumericNode<i64>> {
        self.integer(Setting::Height)
    }

    fn set_height(&mut self, height: i64) -> Result<()> {
        self.write_integer(Setting::Height, height)
    }

    fn gamma(&self) -> Result<NumericNode<f64>> {
        self.float(Setting::Gamma)
    }

    fn set_gamma(&mut self, gamma: f64) -> Result<()> {
        self.write_float(Setting::Gamma, gamma)
    }
}

impl CameraDevice for SimulatedCamera {
    type Stream<'a> = SimulatedStream<'a>;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn stream_node_map(&mut self) -> &mut StreamSettings {
        &mut self.stream_settings
    }

    fn start_stream(&mut self, buffer_count: usize) -> Result<Self::Stream<'_>> {
        if buffer_count == 0 {
            return Err(CaptureError::Stream(String::from(
                "a stream needs at least one buffer",
            )));
        }
        let pixel_format = self.current_pixel_format()?;
        let width = self.integer(Setting::Width)?.value;
        let height = self.integer(Setting::Height)?.value;
        self.stream_log.started.push(buffer_count);
        self.stream_log.settings.push(self.stream_settings);

        Ok(SimulatedStream {
            pixel_format,
            width: u32::try_from(width).map_err(|e| CaptureError::Backend(e.to_string()))?,
            height: u32::try_from(height).map_err(|e| CaptureError::Backend(e.to_string()))?,
            pool: buffer_count,
            leased: HashSet::new(),
            camera: self,
        })
    }
}

/// Stream of synthetic gradient frames. Leased buffers are tracked so a
/// requeue of a foreign or already returned buffer is reported.
pub struct SimulatedStream<'a> {
    camera: &'a mut SimulatedCamera,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    pool: usize,
    leased: HashSet<u64>,
}

impl SimulatedStream<'_> {
    fn next_buffer(&mut self) -> Result<Buffer> {
        let frame_id = self.camera.stream_log.delivered;
        if self.camera.fail_after.is_some_and(|limit| frame_id >= limit) {
            return Err(CaptureError::Stream(format!(
                "simulated transport failure at frame {frame_id}"
            )));
        }
        if self.leased.len() >= self.pool {
            return Err(CaptureError::Stream(format!(
                "all {} buffers are leased, requeue before grabbing more",
                self.pool
            )));
        }

        let mut data = gradient(self.width, self.height, self.pixel_format, frame_id);
        let has_chunk_data = self.camera.chunk_bytes > 0;
        data.extend(std::iter::repeat(0xC5).take(self.camera.chunk_bytes));

        self.camera.stream_log.delivered += 1;
        self.leased.insert(frame_id);
        Ok(Buffer {
            frame_id,
            width: self.width,
            height: self.height,
            bits_per_pixel: self.pixel_format.bits_per_pixel(),
            pixel_format: self.pixel_format,
            has_chunk_data,
            data,
        })
    }

    fn release(&mut self, buffer: &Buffer) -> Result<()> {
        if self.leased.remove(&buffer.frame_id) {
            Ok(())
        } else {
            Err(CaptureError::Stream(format!(
                "frame {} was not leased from this stream",
                buffer.frame_id
            )))
        }
    }
}

/// Diagonal ramp that shifts by one every frame.
fn gradient(width: u32, height: u32, format: PixelFormat, frame_id: u64) -> Vec<u8> {
    let bytes_per_pixel = (format.bits_per_pixel() / 8) as usize;
    let mut data = Vec::with_capacity(width as usize * height as usize * bytes_per_pixel);
    for y in 0..u64::from(height) {
        for x in 0..u64::from(width) {
            let level = x + y + frame_id;
            match format {
                PixelFormat::Mono8 | PixelFormat::BayerRG8 => data.push((level % 256) as u8),
                PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                    data.extend_from_slice(&((level % 4096) as u16).to_le_bytes());
                }
                PixelFormat::RGB8 => {
                    data.extend_from_slice(&[(level % 256) as u8, (x % 256) as u8, (y % 256) as u8]);
                }
            }
        }
    }
    data
}

impl CaptureStream for SimulatedStream<'_> {
    fn get_buffer(&mut self) -> Result<Buffer> {
        self.next_buffer()
    }

    fn get_buffers(&mut self, count: usize, timeout: Duration) -> Result<Vec<Buffer>> {
        if count > self.pool - self.leased.len() {
            return Err(CaptureError::Stream(format!(
                "timed out after {timeout:?} waiting for {count} buffers from a pool of {}",
                self.pool
            )));
        }
        let delivered = self.camera.stream_log.delivered;
        if let Some(limit) = self.camera.fail_after {
            if delivered + count as u64 > limit {
                return Err(CaptureError::Stream(format!(
                    "simulated transport failure within frames {delivered}..{}",
                    delivered + count as u64
                )));
            }
        }
        (0..count).map(|_| self.next_buffer()).collect()
    }

    fn requeue_buffer(&mut self, buffer: Buffer) -> Result<()> {
        self.release(&buffer)?;
        self.camera.stream_log.requeue_calls.push(1);
        Ok(())
    }

    fn requeue_buffers(&mut self, buffers: Vec<Buffer>) -> Result<()> {
        for buffer in &buffers {
            self.release(buffer)?;
        }
        self.camera.stream_log.requeue_calls.push(buffers.len());
        Ok(())
    }

    fn stop(self) -> Result<()> {
        self.camera.stream_log.stopped += 1;
        Ok(())
    }
}

/// Device system that finds nothing for a configurable number of calls
/// before copies of its template camera show up.
#[derive(Debug)]
pub struct SimulatedSystem {
    template: SimulatedCamera,
    device_count: usize,
    empty_discoveries: u32,
    discovery_calls: u32,
    destroyed: Vec<SimulatedCamera>,
}

impl SimulatedSystem {
    /// System that hands out copies of `template`.
    pub fn new(template: SimulatedCamera) -> Self {
        Self {
            template,
            device_count: 1,
            empty_discoveries: 0,
            discovery_calls: 0,
            destroyed: Vec::new(),
        }
    }

    /// Report `count` cameras per successful discovery. Each copy gets its
    /// own id and serial number, `Simulated-0001` onwards.
    pub fn with_devices(mut self, count: usize) -> Self {
        self.device_count = count;
        self
    }

    /// Return an empty device list for the first `calls` discoveries.
    pub fn with_empty_discoveries(mut self, calls: u32) -> Self {
        self.empty_discoveries = calls;
        self
    }

    /// Number of discovery calls so far.
    pub fn discovery_calls(&self) -> u32 {
        self.discovery_calls
    }

    /// Devices released through [`DeviceSystem::destroy_device`], in order.
    pub fn destroyed(&self) -> &[SimulatedCamera] {
        &self.destroyed
    }
}

impl Default for SimulatedSystem {
    fn default() -> Self {
        Self::new(SimulatedCamera::new())
    }
}

impl DeviceSystem for SimulatedSystem {
    type Device = SimulatedCamera;

    fn create_devices(&mut self) -> Result<Vec<Self::Device>> {
        self.discovery_calls += 1;
        if self.discovery_calls <= self.empty_discoveries {
            Ok(Vec::new())
        } else {
            Ok((1..=self.device_count)
                .map(|number| {
                    let info = DeviceInfo {
                        id: format!("Simulated-{number:04}"),
                        serial: format!("{number:04}"),
                        ..self.template.info.clone()
                    };
                    self.template.clone().with_info(info)
                })
                .collect())
        }
    }

    fn destroy_device(&mut self, device: Self::Device) -> Result<()> {
        self.destroyed.push(device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_exposure_is_locked_until_auto_is_off() {
        let mut camera = SimulatedCamera::new();
        assert!(!camera.exposure_time().expect("node").writable);
        assert!(matches!(
            camera.set_exposure_time(1000.0),
            Err(CaptureError::ParameterNotWritable {
                setting: Setting::ExposureTime
            })
        ));

        camera.set_exposure_auto(AutoMode::Off).expect("auto off");
        camera.set_exposure_time(1000.0).expect("manual exposure");
        assert_eq!(camera.float_value(Setting::ExposureTime), Some(1000.0));
    }

    #[test]
    fn test_binning_shrinks_resolution() {
        let mut camera = SimulatedCamera::new();
        camera
            .set_binning(BinningAxis::Horizontal, 2)
            .expect("horizontal");
        camera.set_binning(BinningAxis::Vertical, 4).expect("vertical");
        assert_eq!(camera.width().expect("width").max, 720);
        assert_eq!(camera.height().expect("height").max, 270);
    }

    #[test]
    fn test_frame_rate_bounds_exposure() {
        let mut camera = SimulatedCamera::new();
        camera.set_frame_rate_enable(true).expect("enable");
        camera.set_frame_rate(10.0).expect("frame rate");
        let exposure = camera.exposure_time().expect("exposure");
        assert!((exposure.max - 100_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_stream_tracks_leases() {
        let mut camera = SimulatedCamera::new().with_chunk_data(8);
        let mut stream = camera.start_stream(2).expect("stream");

        let first = stream.get_buffer().expect("first");
        let second = stream.get_buffer().expect("second");
        assert!(first.has_chunk_data);
        assert_eq!(first.data.len(), 640 * 480 + 8);
        assert!(matches!(stream.get_buffer(), Err(CaptureError::Stream(_))));

        stream.requeue_buffers(vec![first, second]).expect("requeue");
        let stale = Buffer {
            frame_id: 0,
            width: 1,
            height: 1,
            bits_per_pixel: 8,
            pixel_format: PixelFormat::Mono8,
            has_chunk_data: false,
            data: vec![0],
        };
        assert!(stream.requeue_buffer(stale).is_err());
        stream.stop().expect("stop");

        assert_eq!(camera.stream_log().requeue_calls, vec![2]);
        assert_eq!(camera.stream_log().stopped, 1);
    }

    #[test]
    fn test_sixteen_bit_frames_are_little_endian_words() {
        let data = gradient(4, 1, PixelFormat::Mono16, 300);
        assert_eq!(data.len(), 8);
        assert_eq!(u16::from_le_bytes([data[0], data[1]]), 300);
        assert_eq!(u16::from_le_bytes([data[6], data[7]]), 303);
    }

    #[test]
    fn test_system_stays_empty_for_scripted_calls() {
        let mut system = SimulatedSystem::new(SimulatedCamera::new()).with_empty_discoveries(2);
        assert!(system.create_devices().expect("call 1").is_empty());
        assert!(system.create_devices().expect("call 2").is_empty());
        assert_eq!(system.create_devices().expect("call 3").len(), 1);
        assert_eq!(system.discovery_calls(), 3);
    }

    #[test]
    fn test_system_reports_distinct_devices() {
        let mut system = SimulatedSystem::new(SimulatedCamera::new()).with_devices(3);
        let devices = system.create_devices().expect("discovery");
        let ids: Vec<&str> = devices.iter().map(|device| device.info().id.as_str()).collect();
        assert_eq!(ids, vec!["Simulated-0001", "Simulated-0002", "Simulated-0003"]);
        assert_eq!(devices[2].info().serial, "0003");
        assert_eq!(devices[2].info().vendor, "Simulated");
    }
}
