use crate::devices::hardware::camera::{BufferHandlingMode, StreamNodeMap};
use crate::error::Result;
use tracing::info;

/// Set the transport options of the stream. The transport does not allow
/// changing them on a live stream, so this runs before the stream starts.
///
/// * Buffer handling `NewestOnly` always delivers the most recent frame,
///   skipping older unread ones when the consumer falls behind.
/// * Automatic packet size negotiation lets the camera send the largest
///   packet the host accepts, fewer interrupts per frame.
/// * Packet resend asks the camera to send missed UDP packets again so
///   frames arrive complete.
///
/// * `nodes`: stream node-map of the device.
pub fn prepare_stream<N: StreamNodeMap + ?Sized>(nodes: &mut N) -> Result<()> {
    nodes.set_buffer_handling_mode(BufferHandlingMode::NewestOnly)?;
    nodes.set_auto_negotiate_packet_size(true)?;
    nodes.set_packet_resend(true)?;
    info!("Stream set to NewestOnly with packet size negotiation and packet resend");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::hardware::camera::{CameraDevice, CaptureStream, StreamSettings};
    use crate::devices::software::camera::SimulatedCamera;

    #[test]
    fn test_stream_options_set() {
        let mut settings = StreamSettings::default();
        prepare_stream(&mut settings).expect("stream setup");
        assert_eq!(
            settings,
            StreamSettings {
                buffer_handling_mode: BufferHandlingMode::NewestOnly,
                auto_negotiate_packet_size: true,
                packet_resend: true,
            }
        );
    }

    #[test]
    fn test_options_in_force_when_stream_starts() {
        let mut camera = SimulatedCamera::new();
        prepare_stream(camera.stream_node_map()).expect("stream setup");
        let stream = camera.start_stream(4).expect("stream");
        stream.stop().expect("stop");
        let settings = camera.stream_log().settings[0];
        assert_eq!(settings.buffer_handling_mode, BufferHandlingMode::NewestOnly);
        assert!(settings.packet_resend);
    }
}
