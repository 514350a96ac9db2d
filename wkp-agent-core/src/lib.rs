#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod collectors;
pub mod config;
pub mod events;
pub mod informer;
pub mod processors;
pub mod queue;
pub mod transport;
