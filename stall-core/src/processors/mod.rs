//! Background processors.
//!
//! - `NotificationDispatcher`: receives `OrderNotice`, delivers order confirmations
//! - `PendingSweeper`: cancels stale PENDING orders on an interval
//!
//! Both stop when the shared shutdown `watch` flips to `true`.

pub mod notification_dispatcher;
pub mod pending_sweeper;

pub use notification_dispatcher::{Dispatch, DispatchError, NotificationDispatcher};
pub use pending_sweeper::PendingSweeper;
