pub mod core_relayer;
pub mod hub;
pub mod spoke;
pub mod wormhole;
