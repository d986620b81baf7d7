//! Persisted chain order: one little-endian `i32` per slot, in execution order.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::order::{ChainOrder, EffectKind, OrderError, NUM_EFFECTS};

/// Size of an encoded order in bytes.
pub const STATE_LEN: usize = NUM_EFFECTS * 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("state blob is {0} bytes, expected 20")]
    WrongLength(usize),
    #[error("slot {slot} holds unknown effect id {value}")]
    UnknownEffect { slot: usize, value: i32 },
    #[error("state holds an invalid order: {0}")]
    InvalidOrder(#[from] OrderError),
}

pub fn encode_order(order: &ChainOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(STATE_LEN);
    for slot in order.slots() {
        let value = slot.map_or(-1, |k| k.index() as i32);
        // Writing into a Vec cannot fail.
        let _ = out.write_i32::<LittleEndian>(value);
    }
    out
}

/// Decode and validate. Anything but a full permutation is rejected whole.
pub fn decode_order(bytes: &[u8]) -> Result<ChainOrder, StateError> {
    if bytes.len() != STATE_LEN {
        return Err(StateError::WrongLength(bytes.len()));
    }
    let mut cursor = Cursor::new(bytes);
    let mut slots = [None; NUM_EFFECTS];
    for (slot, out) in slots.iter_mut().enumerate() {
        let value = cursor
            .read_i32::<LittleEndian>()
            .map_err(|_| StateError::WrongLength(bytes.len()))?;
        let kind = EffectKind::from_index(value as i64)
            .ok_or(StateError::UnknownEffect { slot, value })?;
        *out = Some(kind);
    }
    let order = ChainOrder::from_slots(slots);
    order.validate()?;
    Ok(order)
}
