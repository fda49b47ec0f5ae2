pub mod catalog;
pub mod client;
pub mod control_plane;
pub mod memory;
pub mod tree;
pub mod walker;

pub use control_plane::{ControlPlane, KubeControlPlane, CORE_GROUP};
pub use memory::MemoryControlPlane;
