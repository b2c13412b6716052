use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker-assigned ticket. Shared by a pending order and the position it becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for Ticket {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Monotonic ticket source, unique within one broker instance.
#[derive(Debug, Clone)]
pub struct TicketGen {
    next: u64,
}

impl TicketGen {
    pub const FIRST: u64 = 1000;

    pub fn new() -> Self {
        Self { next: Self::FIRST }
    }

    pub fn next_ticket(&mut self) -> Ticket {
        let t = Ticket(self.next);
        self.next += 1;
        t
    }

    /// The ticket the next call will return.
    pub fn peek(&self) -> Ticket {
        Ticket(self.next)
    }
}

impl Default for TicketGen {
    fn default() -> Self {
        Self::new()
    }
}
