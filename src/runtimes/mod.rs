//! Runtime bridge implementations.
//!
//! One bridge per supported container runtime. Each produces the exact
//! command sequences existing node tooling expects.

pub mod containerd;
pub mod crio;
pub mod docker;

pub use self::containerd::ContainerdBridge;
pub use self::crio::CrioBridge;
pub use self::docker::DockerBridge;
