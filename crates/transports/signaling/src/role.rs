//! Handshake role selection

use std::fmt;

use crate::{Error, Result};

/// Side of the handshake this process plays. Fixed for one handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Creates and sends the offer, then waits for the answer
    Initiator,
    /// Waits for the offer, then creates and sends the answer
    Receiver,
}

impl Role {
    /// Build a role from the two mutually exclusive mode selectors.
    ///
    /// Selecting both or neither is a configuration error; it is reported
    /// before any network activity.
    pub fn from_flags(initiator: bool, receiver: bool) -> Result<Self> {
        match (initiator, receiver) {
            (true, false) => Ok(Role::Initiator),
            (false, true) => Ok(Role::Receiver),
            (true, true) => Err(Error::InvalidConfig(
                "initiator and receiver modes are mutually exclusive".to_string(),
            )),
            (false, false) => Err(Error::InvalidConfig(
                "select exactly one of initiator or receiver mode".to_string(),
            )),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}
