//! One-shot register and coil operations over logical addresses.
//!
//! Each operation translates a PLC documentation address to a wire offset,
//! issues a single transaction against the device link, and reports any
//! failure before propagating it. Failures are surfaced through [`LinkError`]
//! only; there is no in-band sentinel value, so a legitimate register value
//! can never be mistaken for a failed read.

use tracing::error;

use crate::addressing::{coil_offset, register_offset};
use crate::link::{DeviceLink, LinkError};

fn narrow_offset(offset: u32, address: u32) -> Result<u16, String> {
    u16::try_from(offset).map_err(|_| {
        format!(
            "Address {} maps outside the 16-bit offset space",
            address
        )
    })
}

/// Read a single holding register.
pub async fn read_register<L: DeviceLink>(link: &L, address: u32) -> Result<u16, LinkError> {
    let result = read_registers_inner(link, address, 1)
        .await
        .and_then(|values| {
            values
                .first()
                .copied()
                .ok_or_else(|| LinkError::Read("Empty response".to_string()))
        });

    if let Err(e) = &result {
        error!("Failed to read register {}: {}", address, e);
    }
    result
}

/// Read `count` consecutive holding registers starting at `start`.
///
/// The start address is translated once; element `i` of the result belongs
/// to logical address `start + i`. The range must stay within one numbering
/// block. All-or-nothing: a failure never yields a partial result.
pub async fn read_registers<L: DeviceLink>(
    link: &L,
    start: u32,
    count: u16,
) -> Result<Vec<u16>, LinkError> {
    let result = read_registers_inner(link, start, count).await;

    if let Err(e) = &result {
        error!("Failed to read {} registers from {}: {}", count, start, e);
    }
    result
}

async fn read_registers_inner<L: DeviceLink>(
    link: &L,
    start: u32,
    count: u16,
) -> Result<Vec<u16>, LinkError> {
    let offset = narrow_offset(register_offset(start), start).map_err(LinkError::Read)?;
    link.read_holding(offset, count).await
}

/// Write a single holding register.
pub async fn write_register<L: DeviceLink>(
    link: &L,
    address: u32,
    value: u16,
) -> Result<(), LinkError> {
    let result = match narrow_offset(register_offset(address), address) {
        Ok(offset) => link.write_holding(offset, value).await,
        Err(msg) => Err(LinkError::Write(msg)),
    };

    if let Err(e) = &result {
        error!("Failed to write register {}: {}", address, e);
    }
    result
}

/// Read a single coil.
pub async fn read_coil<L: DeviceLink>(link: &L, address: u32) -> Result<bool, LinkError> {
    let result = async {
        let offset = narrow_offset(coil_offset(address), address).map_err(LinkError::Read)?;
        let values = link.read_coils(offset, 1).await?;
        values
            .first()
            .copied()
            .ok_or_else(|| LinkError::Read("Empty response".to_string()))
    }
    .await;

    if let Err(e) = &result {
        error!("Failed to read coil {}: {}", address, e);
    }
    result
}

/// Write a single coil.
pub async fn write_coil<L: DeviceLink>(
    link: &L,
    address: u32,
    value: bool,
) -> Result<(), LinkError> {
    let result = match narrow_offset(coil_offset(address), address) {
        Ok(offset) => link.write_coil(offset, value).await,
        Err(msg) => Err(LinkError::Write(msg)),
    };

    if let Err(e) = &result {
        error!("Failed to write coil {}: {}", address, e);
    }
    result
}
