//! Core module - enums, settings, dialects, boundaries and the target model

pub mod boundary;
pub mod dialect;
pub mod enums;
pub mod settings;
pub mod target;

pub use boundary::{Boundary, Payload, BOUNDARIES};
pub use dialect::{Capabilities, Dialect, PayloadTemplate};
pub use enums::*;
pub use settings::*;
pub use target::{Parameter, ScanTarget};
