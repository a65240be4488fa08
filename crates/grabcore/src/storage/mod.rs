//! Persistent state kept between a probe and the quality callback

pub mod session;

pub use session::{Session, SessionError, SessionStore};
