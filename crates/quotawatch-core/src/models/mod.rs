//! Data models for QuotaWatch

mod notification;
mod quota;

pub use notification::*;
pub use quota::*;
