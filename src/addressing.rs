//! Translation between PLC documentation addressing and wire offsets.
//!
//! Engineering documentation numbers holding registers from 400001 and
//! coils from 100001, while the wire protocol uses zero-based offsets.
//! Addresses below a block base are taken to be wire-relative already and
//! pass through unchanged. The two numbering blocks are independent: the
//! caller must know whether it holds a register or a coil address, because
//! the bases differ and nothing in the value itself distinguishes them.
//!
//! Translation is pure integer arithmetic. Narrowing the resulting offset
//! to the transport's 16-bit address space is the caller's concern (see
//! [`crate::ops`] and config validation).

/// First logical address of the holding-register numbering block.
pub const HOLDING_REGISTER_BASE: u32 = 400_001;

/// First logical address of the coil numbering block.
pub const COIL_BASE: u32 = 100_001;

/// Translate a logical holding-register address to a zero-based wire offset.
pub fn register_offset(address: u32) -> u32 {
    if address >= HOLDING_REGISTER_BASE {
        address - HOLDING_REGISTER_BASE
    } else {
        address
    }
}

/// Translate a logical coil address to a zero-based wire offset.
pub fn coil_offset(address: u32) -> u32 {
    if address >= COIL_BASE {
        address - COIL_BASE
    } else {
        address
    }
}
