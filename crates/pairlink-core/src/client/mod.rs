pub mod config;
pub mod controller;
pub mod pairing;
pub mod poller;
pub mod remote;
pub mod store;
pub mod timers;
pub mod types;

pub use config::{ControllerConfig, RemoteServiceConfig};
pub use controller::ConnectionController;
pub use remote::{ApiError, HttpSessionApi, SessionApi};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
pub use timers::TimerRegistry;
pub use types::{
    ConnectError, ConnectionError, ConnectionSnapshot, ConnectionStatus, DisconnectError,
};
