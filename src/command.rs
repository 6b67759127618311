use crate::client::Role;
use crate::clock::{Clock, LONG_TURN_SECS, MULLIGAN_SECS, TURN_SECS};
use crate::registry::ConnectionRegistry;
use common::Slot;
use tracing::debug;

pub const CLAIM_ADMIN: i64 = 42;
pub const END_TURN: i64 = 99;
pub const LONG_TURN_OFFSET: i64 = 100;
pub const MULLIGAN: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ClaimAdmin,
    ClaimSlot(Slot),
    StartTurn { slot: Slot, duration: u32 },
    StartAllTurns { duration: u32 },
    EndTurn(Slot),
}

impl Command {
    // What a value means depends on who sent it. Anything that doesn't fit the
    // sender's role is ignored.
    pub fn interpret(value: i64, role: Role) -> Option<Command> {
        match role {
            Role::Unassigned => {
                if value == CLAIM_ADMIN {
                    Some(Command::ClaimAdmin)
                } else {
                    Slot::new(value).map(Command::ClaimSlot)
                }
            }
            Role::Admin => {
                if value == MULLIGAN {
                    return Some(Command::StartAllTurns {
                        duration: MULLIGAN_SECS,
                    });
                }
                if let Some(slot) = Slot::new(value) {
                    return Some(Command::StartTurn {
                        slot,
                        duration: TURN_SECS,
                    });
                }
                value
                    .checked_sub(LONG_TURN_OFFSET)
                    .and_then(Slot::new)
                    .map(|slot| Command::StartTurn {
                        slot,
                        duration: LONG_TURN_SECS,
                    })
            }
            Role::Player(slot) => (value == END_TURN).then_some(Command::EndTurn(slot)),
        }
    }

    pub async fn apply(self, id: &str, clock: &Clock, registry: &ConnectionRegistry) {
        let applied = match self {
            Command::ClaimAdmin => registry.claim(id, Role::Admin).await,
            Command::ClaimSlot(slot) => registry.claim(id, Role::Player(slot)).await,
            Command::StartTurn { slot, duration } => {
                clock.write().await.start_turn(&[slot], duration);
                true
            }
            Command::StartAllTurns { duration } => {
                clock.write().await.start_turn(&Slot::all(), duration);
                true
            }
            Command::EndTurn(slot) => clock.write().await.end_turn(slot),
        };
        if !applied {
            debug!("{:?} from {} had no effect", self, id);
        }
    }
}
