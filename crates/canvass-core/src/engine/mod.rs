pub mod control;
pub mod runner;

pub use control::{ControlRegistry, RunControl};
pub use runner::Engine;
