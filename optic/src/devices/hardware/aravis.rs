use crate::devices::hardware::camera::{
    AutoMode, BinningAxis, BinningControl, BinningMode, BinningSelector, Buffer, BufferHandlingMode,
    CameraDevice, CaptureStream, DeviceInfo, DeviceSystem, EnumEntry, EnumNode, ExposureControl,
    GainControl, ImageFormatControl, NumericNode, PixelFormat, Setting, StreamSettings,
};
use crate::error::{CaptureError, Result};
use aravis::glib::{prelude::ObjectExt, Cast};
use aravis::{
    Aravis, BufferStatus, Camera, CameraExt, CameraExtManual, GvStream, GvStreamPacketResend,
    StreamExt,
};
use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

fn backend<E: Display>(e: E) -> CaptureError {
    CaptureError::Backend(e.to_string())
}

/// Discovery through the aravis interface list, GigE-Vision and USB3
/// cameras alike. Holds the process-wide aravis token, so only one system
/// exists per process.
pub struct AravisSystem {
    aravis: Aravis,
}

impl AravisSystem {
    /// Take the aravis token. Fails when another system already holds it.
    pub fn new() -> Result<Self> {
        let aravis = Aravis::initialize().map_err(backend)?;
        Ok(Self { aravis })
    }
}

fn device_info(found: &aravis::DeviceInfo) -> DeviceInfo {
    let address = found.address.to_string_lossy();
    DeviceInfo {
        id: found.id.to_string_lossy().into_owned(),
        vendor: found.vendor.to_string_lossy().into_owned(),
        model: found.model.to_string_lossy().into_owned(),
        // aravis has no serial number in its device list.
        serial: found.physical_id.to_string_lossy().into_owned(),
        address: (!address.is_empty()).then(|| address.into_owned()),
    }
}

impl DeviceSystem for AravisSystem {
    type Device = AravisCamera;

    fn create_devices(&mut self) -> Result<Vec<Self::Device>> {
        let found = self.aravis.get_device_list();
        debug!("aravis reports {} devices", found.len());

        let mut devices = Vec::with_capacity(found.len());
        for entry in &found {
            let info = device_info(entry);
            match Camera::new(Some(&info.id)) {
                Ok(camera) => devices.push(AravisCamera::new(camera, info)),
                Err(e) => warn!("Failed to open {info}: {e}"),
            }
        }
        Ok(devices)
    }

    fn destroy_device(&mut self, device: Self::Device) -> Result<()> {
        info!("Closing {}", device.info);
        drop(device);
        Ok(())
    }
}

/// Camera opened through aravis. Node access goes through the generic
/// GenICam feature accessors so every `Setting` maps onto its feature name.
pub struct AravisCamera {
    camera: Camera,
    info: DeviceInfo,
    stream_settings: StreamSettings,
}

impl AravisCamera {
    fn new(camera: Camera, info: DeviceInfo) -> Self {
        Self {
            camera,
            info,
            stream_settings: StreamSettings::default(),
        }
    }

    fn feature(setting: Setting) -> &'static str {
        setting.into()
    }

    /// A feature the device does not expose is reported as not writable.
    fn available(&self, setting: Setting) -> Result<bool> {
        self.camera
            .is_feature_available(Self::feature(setting))
            .map_err(backend)
    }

    fn float(&self, setting: Setting) -> Result<NumericNode<f64>> {
        let name = Self::feature(setting);
        let (min, max) = self.camera.float_bounds(name).map_err(backend)?;
        Ok(NumericNode {
            value: self.camera.float(name).map_err(backend)?,
            min,
            max,
            writable: self.available(setting)?,
        })
    }

    fn integer(&self, setting: Setting) -> Result<NumericNode<i64>> {
        let name = Self::feature(setting);
        let (min, max) = self.camera.integer_bounds(name).map_err(backend)?;
        Ok(NumericNode {
            value: self.camera.integer(name).map_err(backend)?,
            min,
            max,
            writable: self.available(setting)?,
        })
    }

    fn enumeration(&self, setting: Setting) -> Result<EnumNode> {
        let name = Self::feature(setting);
        let entries = self
            .camera
            .dup_available_enumerations_as_strings(name)
            .map_err(backend)?
            .into_iter()
            .map(|entry| EnumEntry {
                name: entry.to_string(),
                readable: true,
            })
            .collect();
        Ok(EnumNode {
            value: self.camera.string(name).map_err(backend)?.to_string(),
            entries,
            writable: self.available(setting)?,
        })
    }

    fn write_float(&mut self, setting: Setting, value: f64) -> Result<()> {
        debug!("aravis write {setting} = {value}");
        self.camera
            .set_float(Self::feature(setting), value)
            .map_err(backend)
    }

    fn write_integer(&mut self, setting: Setting, value: i64) -> Result<()> {
        debug!("aravis write {setting} = {value}");
        self.camera
            .set_integer(Self::feature(setting), value)
            .map_err(backend)
    }

    fn write_entry(&mut self, setting: Setting, entry: &str) -> Result<()> {
        debug!("aravis write {setting} = {entry}");
        self.camera
            .set_string(Self::feature(setting), entry)
            .map_err(backend)
    }
}

impl ExposureControl for AravisCamera {
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
        debug!("aravis write AcquisitionFrameRateEnable = {enable}");
        self.camera
            .set_boolean(Self::feature(Setting::AcquisitionFrameRateEnable), enable)
            .map_err(backend)
    }

    fn frame_rate(&self) -> Result<NumericNode<f64>> {
        self.float(Setting::AcquisitionFrameRate)
    }

    fn set_frame_rate(&mut self, hz: f64) -> Result<()> {
        self.write_float(Setting::AcquisitionFrameRate, hz)
    }
}

impl BinningControl for AravisCamera {
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

impl GainControl for AravisCamera {
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

impl ImageFormatControl for AravisCamera {
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

impl CameraDevice for AravisCamera {
    type Stream<'a> = AravisStream<'a>;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn stream_node_map(&mut self) -> &mut StreamSettings {
        &mut self.stream_settings
    }

    fn start_stream(&mut self, buffer_count: usize) -> Result<Self::Stream<'_>> {
        let settings = self.stream_settings;
        if settings.auto_negotiate_packet_size {
            // Only GigE-Vision devices negotiate, USB3 devices report an error.
            match self.camera.gv_auto_packet_size() {
                Ok(()) => info!("Packet size negotiated"),
                Err(e) => warn!("Packet size negotiation not available: {e}"),
            }
        }

        let pixel_format_name = self.camera.string("PixelFormat").map_err(backend)?;
        let pixel_format = PixelFormat::from_str(pixel_format_name.as_str()).map_err(|_| {
            CaptureError::UnsupportedPixelFormat {
                pixel_format: pixel_format_name.to_string(),
                bits_per_pixel: 0,
            }
        })?;
        let payload = self.camera.payload().map_err(backend)? as usize;

        let stream = self.camera.create_stream().map_err(|e| {
            CaptureError::Stream(format!("failed to create the stream: {e}"))
        })?;
        if settings.packet_resend {
            if let Some(gv_stream) = stream.downcast_ref::<GvStream>() {
                gv_stream.set_property("packet-resend", GvStreamPacketResend::Always);
            }
        }
        for _ in 0..buffer_count {
            stream.push_buffer(&aravis::Buffer::new_allocate(payload));
        }
        self.camera
            .start_acquisition()
            .map_err(|e| CaptureError::Stream(format!("failed to start acquisition: {e}")))?;

        Ok(AravisStream {
            camera: &self.camera,
            stream,
            handling: settings.buffer_handling_mode,
            pixel_format,
            leased: HashMap::new(),
        })
    }
}

/// Running aravis stream. Pixel data is copied out of the aravis buffer,
/// which stays parked here until the copy is requeued.
pub struct AravisStream<'a> {
    camera: &'a Camera,
    stream: aravis::Stream,
    handling: BufferHandlingMode,
    pixel_format: PixelFormat,
    leased: HashMap<u64, aravis::Buffer>,
}

impl AravisStream<'_> {
    /// Drop every older ready buffer back into the pool and keep the newest.
    fn newest(&mut self, mut buffer: aravis::Buffer) -> aravis::Buffer {
        while let Some(newer) = self.stream.try_pop_buffer() {
            self.stream.push_buffer(&buffer);
            buffer = newer;
        }
        buffer
    }

    fn lease(&mut self, buffer: aravis::Buffer) -> Result<Buffer> {
        let status = buffer.status();
        if status != BufferStatus::Success {
            self.stream.push_buffer(&buffer);
            return Err(CaptureError::Stream(format!(
                "buffer completed with status {status:?}"
            )));
        }

        let (ptr, len) = buffer.data();
        if ptr.is_null() {
            self.stream.push_buffer(&buffer);
            return Err(CaptureError::InvalidBuffer(String::from(
                "aravis buffer has no data",
            )));
        }
        // SAFETY: aravis owns `len` initialized bytes at `ptr` while `buffer`
        // is alive, and the buffer is not pushed back before the copy ends.
        #[allow(unsafe_code)]
        let data = unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec();

        let width = u32::try_from(buffer.image_width()).map_err(backend)?;
        let height = u32::try_from(buffer.image_height()).map_err(backend)?;
        let leased = Buffer {
            frame_id: buffer.frame_id(),
            width,
            height,
            bits_per_pixel: self.pixel_format.bits_per_pixel(),
            pixel_format: self.pixel_format,
            has_chunk_data: buffer.has_chunks(),
            data,
        };
        self.leased.insert(leased.frame_id, buffer);
        Ok(leased)
    }

    fn release(&mut self, buffer: &Buffer) -> Result<()> {
        let parked = self.leased.remove(&buffer.frame_id).ok_or_else(|| {
            CaptureError::Stream(format!(
                "frame {} was not leased from this stream",
                buffer.frame_id
            ))
        })?;
        self.stream.push_buffer(&parked);
        Ok(())
    }
}

impl CaptureStream for AravisStream<'_> {
    fn get_buffer(&mut self) -> Result<Buffer> {
        let buffer = self
            .stream
            .pop_buffer()
            .ok_or_else(|| CaptureError::Stream(String::from("stream returned no buffer")))?;
        let buffer = match self.handling {
            BufferHandlingMode::NewestOnly => self.newest(buffer),
            BufferHandlingMode::OldestFirst | BufferHandlingMode::OldestFirstOverwrite => buffer,
        };
        self.lease(buffer)
    }

    fn get_buffers(&mut self, count: usize, timeout: Duration) -> Result<Vec<Buffer>> {
        let deadline = Instant::now() + timeout;
        let mut buffers = Vec::with_capacity(count);
        while buffers.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let popped = self
                .stream
                .timeout_pop_buffer(remaining.as_micros() as u64)
                .ok_or_else(|| {
                    CaptureError::Stream(format!(
                        "timed out after {timeout:?} with {} of {count} buffers",
                        buffers.len()
                    ))
                })
                .and_then(|buffer| self.lease(buffer));
            match popped {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    self.requeue_buffers(buffers)?;
                    return Err(e);
                }
            }
        }
        Ok(buffers)
    }

    fn requeue_buffer(&mut self, buffer: Buffer) -> Result<()> {
        self.release(&buffer)
    }

    fn requeue_buffers(&mut self, buffers: Vec<Buffer>) -> Result<()> {
        buffers.iter().try_for_each(|buffer| self.release(buffer))
    }

    fn stop(self) -> Result<()> {
        if !self.leased.is_empty() {
            warn!("Stopping with {} buffers not requeued", self.leased.len());
        }
        self.camera
            .stop_acquisition()
            .map_err(|e| CaptureError::Stream(format!("failed to stop acquisition: {e}")))
    }
}
