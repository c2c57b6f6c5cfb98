pub mod model;
pub mod profile;

pub use profile::{ProfileStore, StaticProfiles};
