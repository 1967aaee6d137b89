// cubit-common — wire protocol, byte buffer, and shared utilities

pub mod buffer;
pub mod httputil;
pub mod log;
pub mod protocol;
pub mod rng;
pub mod util;
