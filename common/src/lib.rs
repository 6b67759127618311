pub mod messages;
mod slot;

pub use messages::{decode_value, ValueError};
pub use slot::{Slot, SLOT_COUNT};
