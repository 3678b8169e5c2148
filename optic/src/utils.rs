/// Reshape buffers into image arrays and encode them.
pub mod image;
/// Macros that locate test resources.
pub mod tests;
