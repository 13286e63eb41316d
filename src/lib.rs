//! Client for Duepi EVO pellet stoves reached through the vendor's cloud
//! relay.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use duepi_link::{ClientConfig, StoveClient};
//!
//! let client = StoveClient::new(ClientConfig::new("duepiwebserver2.com", 3000, "ABC123"))?;
//! client.set_target_temperature(21.0).await?;
//! let state = client.read_state().await?;
//! println!("{} at {:.1}°C", state.status_text, state.room_temp);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod frame;
pub mod proto;
pub mod queue;

#[cfg(test)]
mod testing;

pub use client::StoveClient;
pub use config::{ClientConfig, load_config};
pub use connection::ConnectionState;
pub use decode::{StoveState, StoveStatus};
pub use error::{ClientError, ConfigError};
pub use proto::command::{Command, CommandCode, Register};
