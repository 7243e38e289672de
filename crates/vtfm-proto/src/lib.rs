//! Types shared by the vtfm daemon and its clients.

pub mod catalog;
pub mod config;
pub mod now_playing;
pub mod platform;
pub mod protocol;
pub mod store;
