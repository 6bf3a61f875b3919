//! Core business logic - framework-agnostic allocation, sync, and streak operations.
//!
//! Every stateful operation takes a database connection; nothing here knows about the
//! calendar provider or the language-model vendor beyond the traits they implement.

pub mod advisor;
pub mod allocator;
pub mod event;
pub mod goal;
pub mod rank;
pub mod session;
pub mod streak;
pub mod sync;

pub use allocator::{BudgetAllocation, BudgetAllocator};
pub use event::{CalendarEvent, RawCalendarItem};
pub use streak::{DayOutcome, DayStatus, StreakSimulator};
pub use sync::{SyncDiff, SyncReport};
