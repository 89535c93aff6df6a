//! Event types passed between the services and background processors.

use uuid::Uuid;

/// Work items for the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderNotice {
    /// An order was committed as PAID. Sent once per applied transition.
    Confirmed { order_id: Uuid },
}

impl OrderNotice {
    pub fn order_id(&self) -> Uuid {
        match self {
            OrderNotice::Confirmed { order_id } => *order_id,
        }
    }
}
