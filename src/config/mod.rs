/// Database configuration and connection management
pub mod database;

/// Budget, language-model, and calendar settings loaded from config.toml
pub mod settings;

pub use settings::{AppConfig, BudgetConfig, CalendarConfig, LlmConfig, load_default_config};
