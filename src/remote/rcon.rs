use minecraft_client_rs::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RconError {
    #[error("could not connect to {0}: {1}")]
    Connect(String, String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("rcon worker panicked")]
    Join,
}

/// Minecraft RCON endpoint. Every call opens a fresh connection, which is
/// what the server expects for short administrative commands.
#[derive(Debug, Clone)]
pub struct RconClient {
    address: String,
    password: String,
    timeout: Duration,
}

impl RconClient {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `command` and returns the server's reply text.
    ///
    /// The client library is blocking, so the exchange happens on the
    /// blocking pool and is bounded by the configured timeout.
    pub async fn command(&self, command: &str) -> Result<String, RconError> {
        let address = self.address.clone();
        let password = self.password.clone();
        let command = command.to_string();

        debug!("RCON {} -> {}", address, command);

        let worker = tokio::task::spawn_blocking(move || -> Result<String, RconError> {
            let mut client = Client::new(address.clone())
                .map_err(|e| RconError::Connect(address, e.to_string()))?;
            client
                .authenticate(password)
                .map_err(|e| RconError::Auth(e.to_string()))?;
            let reply = client
                .send_command(command)
                .map_err(|e| RconError::Command(e.to_string()))?;
            let _ = client.close();
            Ok(reply.body)
        });

        match timeout(self.timeout(), worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RconError::Join),
            Err(_) => Err(RconError::Timeout(self.timeout)),
        }
    }
}
