use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the active messaging-account connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No connection has been started
    #[default]
    Idle,
    /// Created on the remote service, waiting for its first status
    Initializing,
    /// Remote is waiting for the pairing code to be scanned
    AwaitingPairing,
    /// Code scanned, session authenticated
    Authenticated,
    /// Fully connected and answering messages
    Connected,
    /// Remote closed the session
    Disconnected,
    /// Remote rejected the pairing
    AuthFailed,
    /// Remote has no record of the connection
    NotFound,
    /// The create request itself failed; nothing was started
    FailedToInitialize,
}

impl ConnectionStatus {
    /// Map a status string reported by the remote service.
    ///
    /// The service calls the awaiting-pairing state `qr_ready`.
    pub fn from_remote(value: &str) -> Option<Self> {
        match value.trim() {
            "initializing" => Some(Self::Initializing),
            "qr_ready" | "awaiting_pairing" => Some(Self::AwaitingPairing),
            "authenticated" => Some(Self::Authenticated),
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            "auth_failed" => Some(Self::AuthFailed),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Authenticated => "authenticated",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::AuthFailed => "auth_failed",
            Self::NotFound => "not_found",
            Self::FailedToInitialize => "failed_to_initialize",
        }
    }

    /// `connected` and `authenticated` both count as paired.
    pub fn is_paired(self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated)
    }

    /// Remote-confirmed end states. Only a fresh `connect` leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::AuthFailed | Self::NotFound)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified error shown to the user as `lastError`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Create request failed; carries the remote service's error text.
    #[error("{0}")]
    Initialization(String),
    #[error("error checking status: {0}")]
    StatusCheck(String),
    #[error("failed to fetch pairing code: {0}")]
    PairingFetch(String),
    #[error("failed to retrieve pairing code after {0} attempts")]
    PairingExhausted(u32),
    #[error("authentication failed, scan the pairing code again")]
    AuthFailed,
    #[error("connection closed by the remote service")]
    Disconnected,
    #[error("connection '{0}' not found on the remote service")]
    NotFound(String),
}

impl ConnectionError {
    /// Errors expected to clear on their own with the next successful query.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StatusCheck(_) | Self::PairingFetch(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::Disconnected | Self::NotFound(_))
    }
}

/// The observable state delivered to subscribers on every change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub pairing_artifact: Option<String>,
    pub last_error: Option<ConnectionError>,
}

impl ConnectionSnapshot {
    pub fn new(
        status: ConnectionStatus,
        pairing_artifact: Option<String>,
        last_error: Option<ConnectionError>,
    ) -> Self {
        Self {
            status,
            pairing_artifact,
            last_error,
        }
    }
}

/// Why `connect` did not start a connection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("connection name is required")]
    MissingName,
    #[error("profile id is required")]
    MissingProfile,
    /// The remote service refused to create the connection.
    #[error("{0}")]
    Create(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DisconnectError {
    /// Local state was torn down but the remote terminate request failed.
    #[error("failed to terminate connection: {0}")]
    Terminate(String),
}
