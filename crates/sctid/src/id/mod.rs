mod category;
mod error;
mod namespace;
mod sctid;
mod verhoeff;

pub use category::*;
pub use error::*;
pub use namespace::*;
pub use sctid::*;
pub use verhoeff::*;
