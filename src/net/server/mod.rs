#![cfg(feature = "net")]

mod core;

pub(crate) use core::{spawn_listener, ServerHandle};
