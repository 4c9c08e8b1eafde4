pub mod artifacts;
pub mod wrappers;
