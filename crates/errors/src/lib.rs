//! Error domain shared by every docgate crate.
//!
//! Each failure carries a stable [`ErrorCode`] whose registered [`CodeSpec`]
//! fixes the HTTP status, kind and default user-facing message. Crates wrap
//! [`ErrorObj`] in their own newtypes and convert at their boundaries.

pub mod code;
pub mod kind;
pub mod labels;
pub mod model;
pub mod prelude;
pub mod render;
pub mod severity;

pub use code::{codes, ErrorCode};
pub use model::{ErrorBuilder, ErrorObj};
