pub mod config;
pub mod error;
pub mod exploit;
pub mod row;

pub use config::{Config, LiveProviderKind};
pub use error::*;
pub use exploit::*;
pub use row::*;
