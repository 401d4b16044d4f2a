//! Foreground window sensing.

pub mod probe;
pub mod process;
pub mod strategies;

pub use probe::{ProbeChain, ProbeError, WindowProbe, WindowSample};
pub use strategies::{platform_chain, CommandProbe};
