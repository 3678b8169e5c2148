/**
Optic drives a single GigE-Vision camera through one capture session: wait for
the device to show up on the network, bring its node-map into a known state,
prepare the stream, pull frames and write them to disk as PNG files.
The camera SDK sits behind a small set of traits, so the same session runs
against a real camera (feature `aravis`) or the in-memory simulated device.
*/

/// Components group devices into a logical unit that performs one step
/// of the acquisition.
pub mod components;
/// Devices that are an atomic unit, such as a camera and its stream.
pub mod devices;
/// Error type shared by every component.
pub mod error;
/// Logging setup for the binaries.
pub mod logging;
/// Image conversion and test helpers.
pub mod utils;
