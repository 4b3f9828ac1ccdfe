//! Process wiring: background threads and the host-side bus subscriber.

pub mod services;
pub mod session_logger;
