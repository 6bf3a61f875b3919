//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables; none of them declare relations,
//! since every table is keyed directly by user.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod budget_allocation;
pub mod goal;
pub mod streak_record;
pub mod user_profile;

// Re-export specific types to avoid conflicts
pub use budget_allocation::{
    Column as BudgetAllocationColumn, Entity as BudgetAllocation, Model as BudgetAllocationModel,
};
pub use goal::{Column as GoalColumn, Entity as Goal, Model as GoalModel};
pub use streak_record::{
    Column as StreakRecordColumn, Entity as StreakRecord, Model as StreakRecordModel,
};
pub use user_profile::{
    Column as UserProfileColumn, Entity as UserProfile, Model as UserProfileModel,
};
