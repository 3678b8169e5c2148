/// Steps of a capture session, in the order they run.
pub mod acquisition {
    /// Retry discovery until a device is connected.
    pub mod discovery;
    /// Session parameters and the parameter file.
    pub mod parameters;
    /// Bring the device node-map into the requested state.
    pub mod configuration;
    /// Transport options of the stream.
    pub mod streaming;
    /// Write buffers to disk.
    pub mod persistence;
    /// Start the stream and pull frames.
    pub mod capture;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::acquisition::capture::*;
    pub use crate::components::acquisition::configuration::*;
    pub use crate::components::acquisition::discovery::*;
    pub use crate::components::acquisition::parameters::*;
    pub use crate::components::acquisition::persistence::*;
    pub use crate::components::acquisition::streaming::*;
}
