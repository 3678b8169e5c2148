/// Devices backed by a vendor SDK, and the traits every camera backend
/// implements.
pub mod hardware {
    /// Node-map, stream and discovery traits plus the shared value types.
    pub mod camera;
    /// Cameras reached through libaravis.
    #[cfg(feature = "aravis")]
    pub mod aravis;
}

/// Devices implemented in software.
pub mod software {
    /// In-memory camera used without hardware and in tests.
    pub mod camera;
}
