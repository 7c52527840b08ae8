//! Sample models implementing the [`Model`](crate::framework::Model) trait.

pub mod computer;
pub mod group;

pub use computer::*;
pub use group::*;
