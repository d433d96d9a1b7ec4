//! Default implementations of [crate::registry::Registry]

pub mod dns;
pub mod fixed;
pub mod retry;
