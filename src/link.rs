//! Device link: a lazily connected, serialized Modbus TCP transport.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::config::DeviceConfig;

/// Errors surfaced by device link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Write failed: {0}")]
    Write(String),
}

/// Read/write primitives over zero-based wire offsets.
///
/// The polling engine and the one-shot operations are generic over this
/// trait so they can be driven against scripted stubs in tests.
#[allow(async_fn_in_trait)]
pub trait DeviceLink {
    /// Read `count` holding registers starting at `offset`.
    async fn read_holding(&self, offset: u16, count: u16) -> Result<Vec<u16>, LinkError>;

    /// Read `count` coils starting at `offset`.
    async fn read_coils(&self, offset: u16, count: u16) -> Result<Vec<bool>, LinkError>;

    /// Write a single holding register at `offset`.
    async fn write_holding(&self, offset: u16, value: u16) -> Result<(), LinkError>;

    /// Write a single coil at `offset`.
    async fn write_coil(&self, offset: u16, value: bool) -> Result<(), LinkError>;
}

/// A connection to a single Modbus TCP device.
///
/// The underlying context is created lazily on first use and lives until the
/// process exits. A mutex serializes all transactions: the protocol is
/// strictly request/response and does not tolerate interleaved requests on
/// one connection, so concurrent pollers sharing a link take turns.
///
/// A transport-level failure drops the held context, leaving the slot empty
/// so the next operation reconnects. Modbus exception responses (e.g. an
/// illegal data address) arrive over a healthy connection and do not.
pub struct ModbusLink {
    addr: SocketAddr,
    slave: Slave,
    timeout: Duration,
    ctx: Mutex<Option<Context>>,
}

impl ModbusLink {
    /// Create an unconnected link to the configured device endpoint.
    pub fn new(config: &DeviceConfig) -> Result<Self, LinkError> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| LinkError::Connect(format!("Invalid address: {}", e)))?;

        Ok(Self {
            addr,
            slave: Slave(config.unit_id),
            timeout: Duration::from_millis(config.timeout_ms),
            ctx: Mutex::new(None),
        })
    }

    /// Return the held context, connecting first if no connection exists.
    ///
    /// Idempotent: an existing context is returned as-is. On failure the
    /// slot stays empty, so the next operation retries the connection.
    async fn ensure_connected<'a>(
        &self,
        slot: &'a mut Option<Context>,
    ) -> Result<&'a mut Context, LinkError> {
        match slot {
            Some(ctx) => Ok(ctx),
            None => {
                let ctx =
                    tokio::time::timeout(self.timeout, tcp::connect_slave(self.addr, self.slave))
                        .await
                        .map_err(|_| LinkError::Connect("Connection timeout".to_string()))?
                        .map_err(|e| LinkError::Connect(e.to_string()))?;

                debug!("Connected to Modbus device at {}", self.addr);
                Ok(slot.insert(ctx))
            }
        }
    }
}

impl DeviceLink for ModbusLink {
    async fn read_holding(&self, offset: u16, count: u16) -> Result<Vec<u16>, LinkError> {
        let mut slot = self.ctx.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;

        match ctx.read_holding_registers(offset, count).await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(exception)) => Err(LinkError::Read(format!("Exception: {:?}", exception))),
            Err(e) => {
                *slot = None;
                Err(LinkError::Read(e.to_string()))
            }
        }
    }

    async fn read_coils(&self, offset: u16, count: u16) -> Result<Vec<bool>, LinkError> {
        let mut slot = self.ctx.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;

        match ctx.read_coils(offset, count).await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(exception)) => Err(LinkError::Read(format!("Exception: {:?}", exception))),
            Err(e) => {
                *slot = None;
                Err(LinkError::Read(e.to_string()))
            }
        }
    }

    async fn write_holding(&self, offset: u16, value: u16) -> Result<(), LinkError> {
        let mut slot = self.ctx.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;

        match ctx.write_single_register(offset, value).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(exception)) => Err(LinkError::Write(format!("Exception: {:?}", exception))),
            Err(e) => {
                *slot = None;
                Err(LinkError::Write(e.to_string()))
            }
        }
    }

    async fn write_coil(&self, offset: u16, value: bool) -> Result<(), LinkError> {
        let mut slot = self.ctx.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;

        match ctx.write_single_coil(offset, value).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(exception)) => Err(LinkError::Write(format!("Exception: {:?}", exception))),
            Err(e) => {
                *slot = None;
                Err(LinkError::Write(e.to_string()))
            }
        }
    }
}
