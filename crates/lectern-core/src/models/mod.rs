//! Data models for the upload/quota core
//!
//! Each sub-module represents one persisted aggregate plus its request/response shapes.

mod cleanup;
mod media;
mod quota;
mod upload;

pub use cleanup::*;
pub use media::*;
pub use quota::*;
pub use upload::*;
