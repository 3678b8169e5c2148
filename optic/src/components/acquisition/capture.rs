use crate::components::acquisition::{
    configuration::{apply_configuration, log_initial_values, AppliedConfiguration},
    discovery::acquire_device,
    parameters::ParameterSet,
    persistence::ImageWriter,
    streaming::prepare_stream,
};
use crate::devices::hardware::camera::{CameraDevice, CaptureStream, DeviceInfo, DeviceSystem};
use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum_macros::{Display as StrumDisplay, EnumString};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// How buffers are pulled from the stream.
#[derive(EnumString, StrumDisplay, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureStrategy {
    /// Grab, save and requeue `num_images` buffers one after the other.
    OneAtATime,
    /// Grab `num_buffers` buffers in one request, save them all, then
    /// requeue the whole batch.
    Batch,
}

/// Outcome of a finished capture session.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureReport {
    /// Unique id of the session, also attached to every log line.
    pub session: Uuid,
    /// Device the session ran on.
    pub device: DeviceInfo,
    /// Settings the device ended up with.
    pub configuration: AppliedConfiguration,
    /// Images written, in capture order.
    pub saved: Vec<PathBuf>,
    /// Buffers that could not be written to disk.
    pub failed: usize,
}

/// Unit struct grouping the capture behaviour. Holds no state, the system,
/// parameters and writer are handed to the functions that do the work.
pub struct CaptureController;

impl CaptureController {
    /// Single buffer capture of `num_images` frames.
    ///
    /// * `system`: camera SDK entry point.
    /// * `parameters`: session parameters.
    /// * `writer`: destination of the images.
    pub fn continuous<S: DeviceSystem>(
        system: &mut S,
        parameters: &ParameterSet,
        writer: &ImageWriter,
    ) -> Result<CaptureReport> {
        Self::run(system, parameters, writer, CaptureStrategy::OneAtATime)
    }

    /// One batch of `num_buffers` frames.
    ///
    /// * `system`: camera SDK entry point.
    /// * `parameters`: session parameters.
    /// * `writer`: destination of the images.
    pub fn batch<S: DeviceSystem>(
        system: &mut S,
        parameters: &ParameterSet,
        writer: &ImageWriter,
    ) -> Result<CaptureReport> {
        Self::run(system, parameters, writer, CaptureStrategy::Batch)
    }

    /// Full session: find a device, configure it, capture, then release it.
    /// Parameters are validated before any discovery. The device is released
    /// whether or not the capture succeeded.
    pub fn run<S: DeviceSystem>(
        system: &mut S,
        parameters: &ParameterSet,
        writer: &ImageWriter,
        strategy: CaptureStrategy,
    ) -> Result<CaptureReport> {
        let session = Uuid::new_v4();
        let span = info_span!("capture", %session, %strategy);
        let _entered = span.enter();

        parameters.validate()?;
        let mut device = acquire_device(system, &parameters.discovery)?;
        let captured = Self::run_on_device(&mut device, parameters, writer, strategy, session);

        info!("Releasing device {}", device.info());
        let released = system.destroy_device(device);
        match (captured, released) {
            (Ok(report), Ok(())) => {
                info!(
                    "Capture finished, {} images saved to {} ({} failed)",
                    report.saved.len(),
                    writer.directory().display(),
                    report.failed
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!("Failed to release device after error: {release_error}");
                Err(e)
            }
        }
    }

    fn run_on_device<D: CameraDevice>(
        device: &mut D,
        parameters: &ParameterSet,
        writer: &ImageWriter,
        strategy: CaptureStrategy,
        session: Uuid,
    ) -> Result<CaptureReport> {
        log_initial_values(&*device)?;
        prepare_stream(device.stream_node_map())?;
        let configuration = apply_configuration(device, parameters)?;
        let device_info = device.info().clone();

        let buffer_count = match strategy {
            CaptureStrategy::OneAtATime => parameters.stream_buffer_count,
            CaptureStrategy::Batch => parameters.num_buffers,
        };
        let mut stream = device.start_stream(buffer_count)?;
        info!("Stream started with {buffer_count} buffers");

        let mut report = CaptureReport {
            session,
            device: device_info,
            configuration,
            saved: Vec::new(),
            failed: 0,
        };
        let captured = match strategy {
            CaptureStrategy::OneAtATime => {
                capture_one_at_a_time(&mut stream, parameters, writer, &mut report)
            }
            CaptureStrategy::Batch => capture_batch(&mut stream, parameters, writer, &mut report),
        };

        let stopped = stream.stop();
        info!("Stream stopped");
        match (captured, stopped) {
            (Ok(()), Ok(())) => Ok(report),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_error)) => {
                warn!("Failed to stop stream after error: {stop_error}");
                Err(e)
            }
        }
    }
}

/// Record the outcome of one persist call. Disk and encoder problems are
/// logged and counted, anything else ends the session.
fn record_persisted(report: &mut CaptureReport, index: usize, persisted: Result<PathBuf>) -> Result<()> {
    match persisted {
        Ok(path) => {
            report.saved.push(path);
            Ok(())
        }
        Err(e) if e.is_persistence_failure() => {
            warn!("Image {index} was not saved: {e}");
            report.failed += 1;
            Ok(())
        }
        Err(e) => {
            error!("Image {index} could not be converted: {e}");
            Err(e)
        }
    }
}

fn capture_one_at_a_time<T: CaptureStream>(
    stream: &mut T,
    parameters: &ParameterSet,
    writer: &ImageWriter,
    report: &mut CaptureReport,
) -> Result<()> {
    for index in 0..parameters.num_images {
        let buffer = stream.get_buffer()?;
        debug!(
            "Grabbed frame {} ({}x{}, {} bytes)",
            buffer.frame_id,
            buffer.width,
            buffer.height,
            buffer.data.len()
        );
        let persisted = writer.persist(&buffer, index);
        stream.requeue_buffer(buffer)?;
        record_persisted(report, index, persisted)?;
    }
    Ok(())
}

fn capture_batch<T: CaptureStream>(
    stream: &mut T,
    parameters: &ParameterSet,
    writer: &ImageWriter,
    report: &mut CaptureReport,
) -> Result<()> {
    let buffers = stream.get_buffers(parameters.num_buffers, parameters.timeout())?;
    if buffers.len() != parameters.num_buffers {
        let received = buffers.len();
        stream.requeue_buffers(buffers)?;
        return Err(CaptureError::Stream(format!(
            "requested {} buffers, received {received}",
            parameters.num_buffers
        )));
    }
    info!("Grabbed {} buffers", buffers.len());

    let mut outcome = Ok(());
    for (index, buffer) in buffers.iter().enumerate() {
        outcome = record_persisted(report, index, writer.persist(buffer, index));
        if outcome.is_err() {
            break;
        }
    }
    stream.requeue_buffers(buffers)?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::acquisition::parameters::DiscoveryPolicy;
    use crate::devices::hardware::camera::{PixelFormat, Setting};
    use crate::devices::software::camera::{SimulatedCamera, SimulatedSystem};
    use rstest::rstest;

    fn parameters() -> ParameterSet {
        ParameterSet {
            exposure_time: 2000.0,
            num_images: 4,
            num_buffers: 3,
            stream_buffer_count: 2,
            discovery: DiscoveryPolicy {
                max_tries: 2,
                interval_secs: 0.0,
            },
            ..Default::default()
        }
    }

    fn system() -> SimulatedSystem {
        SimulatedSystem::new(SimulatedCamera::new().with_sensor(32, 24))
    }

    #[test]
    fn test_continuous_requeues_every_buffer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let mut system = system();

        let report = CaptureController::continuous(&mut system, &parameters(), &writer)
            .expect("capture");
        assert_eq!(report.saved.len(), 4);
        assert_eq!(report.failed, 0);
        assert_eq!((report.configuration.width, report.configuration.height), (32, 24));
        for (index, path) in report.saved.iter().enumerate() {
            assert_eq!(path, &writer.image_path(index));
            assert!(path.is_file());
        }

        let camera = &system.destroyed()[0];
        let log = camera.stream_log();
        assert_eq!(log.started, vec![2]);
        assert_eq!(log.requeue_calls, vec![1, 1, 1, 1]);
        assert_eq!(log.stopped, 1);
    }

    #[test]
    fn test_persistence_failure_still_requeues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").expect("blocker");
        let writer = ImageWriter::new(&blocker, "capture");
        let mut system = system();

        let report = CaptureController::continuous(&mut system, &parameters(), &writer)
            .expect("persistence failures are not fatal");
        assert!(report.saved.is_empty());
        assert_eq!(report.failed, 4);

        let log = system.destroyed()[0].stream_log();
        assert_eq!(log.requeued(), 4);
        assert_eq!(log.requeue_calls.len(), 4);
    }

    #[test]
    fn test_batch_writes_then_requeues_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path().join("batch"), "capture");
        let mut system = system();

        let report =
            CaptureController::batch(&mut system, &parameters(), &writer).expect("capture");
        let names: Vec<String> = report
            .saved
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["capture_0000.png", "capture_0001.png", "capture_0002.png"]
        );

        let log = system.destroyed()[0].stream_log();
        assert_eq!(log.started, vec![3]);
        assert_eq!(log.requeue_calls, vec![3]);
        assert_eq!(log.stopped, 1);
    }

    #[rstest]
    #[case(CaptureStrategy::OneAtATime, 2)]
    #[case(CaptureStrategy::Batch, 0)]
    fn test_teardown_after_stream_failure(
        #[case] strategy: CaptureStrategy,
        #[case] delivered: u64,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let mut system =
            SimulatedSystem::new(SimulatedCamera::new().with_sensor(32, 24).with_failure_after(2));

        let result = CaptureController::run(&mut system, &parameters(), &writer, strategy);
        assert!(matches!(result, Err(CaptureError::Stream(_))));

        assert_eq!(system.destroyed().len(), 1);
        let log = system.destroyed()[0].stream_log();
        assert_eq!(log.delivered, delivered);
        assert_eq!(log.stopped, 1);
        assert_eq!(log.requeued() as u64, log.delivered);
    }

    #[test]
    fn test_configuration_failure_releases_device_without_streaming() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let mut system = SimulatedSystem::new(
            SimulatedCamera::new()
                .with_sensor(32, 24)
                .with_read_only(Setting::Gamma),
        );

        let result = CaptureController::continuous(&mut system, &parameters(), &writer);
        assert!(matches!(
            result,
            Err(CaptureError::ParameterNotWritable {
                setting: Setting::Gamma
            })
        ));
        let camera = &system.destroyed()[0];
        assert!(camera.stream_log().started.is_empty());
    }

    #[test]
    fn test_no_device_found_captures_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path().join("never"), "capture");
        let mut system = system().with_empty_discoveries(5);

        let result = CaptureController::continuous(&mut system, &parameters(), &writer);
        assert!(matches!(
            result,
            Err(CaptureError::NoDeviceFound { attempts: 2 })
        ));
        assert!(system.destroyed().is_empty());
        assert!(!writer.directory().exists());
    }

    #[rstest]
    #[case(-1.0)]
    #[case(1.0e20)]
    fn test_invalid_parameters_fail_before_discovery(#[case] interval_secs: f64) {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let parameters = ParameterSet {
            discovery: DiscoveryPolicy {
                max_tries: 2,
                interval_secs,
            },
            ..parameters()
        };
        let mut system = system();

        let result = CaptureController::continuous(&mut system, &parameters, &writer);
        assert!(matches!(result, Err(CaptureError::Config { .. })));
        assert_eq!(system.discovery_calls(), 0);
        assert!(system.destroyed().is_empty());
    }

    #[test]
    fn test_unsupported_pixel_format_stops_before_streaming() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let parameters = ParameterSet {
            pixel_format: PixelFormat::RGB8,
            ..parameters()
        };
        let mut system = system();

        let result = CaptureController::continuous(&mut system, &parameters, &writer);
        assert!(matches!(
            result,
            Err(CaptureError::UnsupportedFeature {
                setting: Setting::PixelFormat,
                ..
            })
        ));
        assert_eq!(system.destroyed().len(), 1);
    }
}
