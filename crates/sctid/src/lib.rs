#![doc = include_str!("../README.md")]

mod allocator;
mod audit;
mod auth;
mod config;
mod coordinator;
mod error;
mod id;
mod lifecycle;
mod record;
mod request;
mod status;
mod store;

pub use crate::allocator::*;
pub use crate::audit::*;
pub use crate::auth::*;
pub use crate::config::*;
pub use crate::coordinator::*;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::lifecycle::*;
pub use crate::record::*;
pub use crate::request::*;
pub use crate::status::*;
pub use crate::store::*;
