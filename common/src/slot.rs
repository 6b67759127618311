use serde::{Deserialize, Serialize};
use std::fmt;

pub const SLOT_COUNT: u8 = 4;

// A player position at the table, always in 1..=SLOT_COUNT
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Slot(u8);

impl Slot {
    pub fn new(num: i64) -> Option<Self> {
        if (1..=SLOT_COUNT as i64).contains(&num) {
            Some(Slot(num as u8))
        } else {
            None
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub fn all() -> [Slot; SLOT_COUNT as usize] {
        [Slot(1), Slot(2), Slot(3), Slot(4)]
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        Slot::new(num.into()).ok_or_else(|| format!("slot {} is outside 1..={}", num, SLOT_COUNT))
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
