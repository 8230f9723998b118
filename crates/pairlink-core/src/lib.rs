pub mod api;

#[cfg(feature = "client")]
pub mod client;
