use common::Slot;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;
use warp::ws::Message;

#[derive(Error, Debug)]
#[error("Error sending message")]
pub struct SendError;

// A connection claims exactly one role, once, out of Unassigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unassigned,
    Player(Slot),
    Admin,
}

impl Role {
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Role::Player(slot) => Some(*slot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sender(pub mpsc::UnboundedSender<Result<Message, warp::Error>>);

#[derive(Debug, Clone)]
pub struct Client {
    pub role: Role,
    pub remote_addr: Option<SocketAddr>,
}

impl Client {
    pub fn new(remote_addr: Option<SocketAddr>) -> Self {
        Client {
            role: Role::Unassigned,
            remote_addr,
        }
    }
}

pub trait SendMsg {
    fn send(&self, msg: &str) -> Result<(), SendError>;
}

impl SendMsg for Sender {
    fn send(&self, msg: &str) -> Result<(), SendError> {
        self.0.send(Ok(Message::text(msg))).map_err(|_| SendError)
    }
}
