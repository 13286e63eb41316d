//! Public face of the protocol client.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState};
use crate::decode::{RawSnapshot, StoveState};
use crate::error::{ClientError, ConfigError};
use crate::frame::{self, Response};
use crate::proto::command::{Command, CommandCode, Register};
use crate::queue::{CommandQueue, PendingReply};

/// Handle to one stove session. Cheap to clone; every clone shares the same
/// connection and command queue, so construct one per process and hand it
/// out to whoever needs it.
#[derive(Clone)]
pub struct StoveClient {
    queue: CommandQueue,
    state: watch::Receiver<ConnectionState>,
}

impl StoveClient {
    /// Validates `config` and starts the command worker. Must be called
    /// from inside a tokio runtime. Nothing is sent until the first command.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let delay = config.timing.command_delay();
        let depth = config.timing.queue_depth;
        let conn = Connection::new(config, state_tx);
        Ok(Self {
            queue: CommandQueue::spawn(conn, delay, depth),
            state,
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    // ── Raw access ───────────────────────────────────────────────────

    pub async fn submit(&self, code: CommandCode) -> Result<Response, ClientError> {
        self.queue.submit(code).await
    }

    /// Queue without waiting; the returned handle resolves to the reply.
    pub fn enqueue(&self, code: CommandCode) -> Result<PendingReply, ClientError> {
        self.queue.enqueue(code)
    }

    pub async fn execute(&self, cmd: Command) -> Result<Response, ClientError> {
        self.submit(cmd.code()).await
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Status register yields the full 32-bit word, the rest 16 bits.
    pub async fn read_register(&self, reg: Register) -> Result<u32, ClientError> {
        let response = self.submit(reg.code()).await?;
        Ok(if reg.is_status_word() {
            response.status_word()
        } else {
            response.register_value().into()
        })
    }

    /// Reads the eight snapshot registers one after another. Any failed read
    /// fails the whole snapshot.
    pub async fn read_state(&self) -> Result<StoveState, ClientError> {
        let status = self.submit(Register::Status.code()).await?.status_word();
        let mut values = [0u16; 7];
        for (slot, reg) in values.iter_mut().zip(&Register::SNAPSHOT[1..]) {
            *slot = self.submit(reg.code()).await?.register_value();
        }
        let [room_temp, fumes_temp, power_level, pellet_speed, exh_fan_rpm, error, setpoint] =
            values;
        let raw = RawSnapshot {
            status,
            room_temp,
            fumes_temp,
            power_level,
            pellet_speed,
            exh_fan_rpm,
            error,
            setpoint,
        };
        debug!(?raw, "snapshot read");
        Ok(raw.into())
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub async fn power_on(&self) -> Result<(), ClientError> {
        info!("power on");
        self.execute(Command::PowerOn).await.map(drop)
    }

    pub async fn power_off(&self) -> Result<(), ClientError> {
        info!("power off");
        self.execute(Command::PowerOff).await.map(drop)
    }

    /// Returns the level actually sent after clamping to 0..=6.
    pub async fn set_power_level(&self, level: i32) -> Result<u8, ClientError> {
        let applied = level.clamp(frame::POWER_LEVEL_MIN, frame::POWER_LEVEL_MAX) as u8;
        info!(requested = level, applied, "set power level");
        self.execute(Command::SetPowerLevel(level)).await?;
        Ok(applied)
    }

    /// Returns the whole-degree setpoint actually sent.
    pub async fn set_target_temperature(&self, celsius: f64) -> Result<u8, ClientError> {
        let applied = frame::clamp_temperature(celsius);
        info!(requested = celsius, applied, "set target temperature");
        self.execute(Command::SetTemperature(celsius)).await?;
        Ok(applied)
    }

    pub async fn reset_error(&self) -> Result<(), ClientError> {
        info!("reset error");
        self.execute(Command::ResetError).await.map(drop)
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Drops the connection; commands still queued fail with
    /// [`ClientError::Disconnected`]. The next command reconnects.
    pub async fn disconnect(&self) {
        self.queue.disconnect().await;
    }

    /// Opens a private session with `config`, reads the status word and
    /// disconnects it again. Reports whether the stove answered. Sessions
    /// held by other clients are left alone.
    pub async fn probe(config: ClientConfig) -> Result<bool, ConfigError> {
        let client = Self::new(config)?;
        let ok = match client.read_register(Register::Status).await {
            Ok(word) => {
                debug!(word = format_args!("0x{word:08x}"), "probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "probe failed");
                false
            }
        };
        client.disconnect().await;
        Ok(ok)
    }
}
