//! Application settings loaded from config.toml
//!
//! Holds the budget figures used to derive the monthly spendable cap and the
//! connection settings for the language-model and calendar collaborators.
//! Secrets are never read from this file; they come from the environment.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default OpenAI-compatible endpoint
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// Default model routed through the endpoint
pub const DEFAULT_LLM_MODEL: &str = "openrouter/free";
/// Default Google Calendar API root
pub const DEFAULT_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Income and savings figures
    pub budget: BudgetConfig,
    /// Language-model collaborator settings
    pub llm: LlmConfig,
    /// Calendar source settings
    pub calendar: CalendarConfig,
}

/// Monthly income, savings goal, and fixed costs, in whole currency units
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Monthly income
    pub monthly_income: i64,
    /// Amount the user wants to keep each month
    pub savings_goal: i64,
    /// Mandatory costs (rent, bills) taken off the top
    pub fixed_costs: i64,
}

impl BudgetConfig {
    /// Spendable cap for the month: income minus savings goal minus fixed costs,
    /// floored at zero.
    #[must_use]
    pub const fn max_spendable(&self) -> i64 {
        let cap = self
            .monthly_income
            .saturating_sub(self.savings_goal)
            .saturating_sub(self.fixed_costs);
        if cap < 0 { 0 } else { cap }
    }
}

/// Settings for the OpenAI-compatible language-model endpoint
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the chat-completions API
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Per-request deadline
    pub timeout_secs: u64,
    /// Optional completion length limit
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout_secs: 60,
            max_tokens: None,
        }
    }
}

/// Settings for the calendar source
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalendarConfig {
    /// Base URL of the calendar API
    pub base_url: String,
    /// Size of the bounded page of upcoming items
    pub max_results: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CALENDAR_BASE_URL.to_string(),
            max_results: 250,
        }
    }
}

impl AppConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Returns `Error::Config` if the TOML is invalid or a budget figure is negative.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config {
            message: format!("Failed to parse config.toml: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let budget = &self.budget;
        for (field, value) in [
            ("monthly_income", budget.monthly_income),
            ("savings_goal", budget.savings_goal),
            ("fixed_costs", budget.fixed_costs),
        ] {
            if value < 0 {
                return Err(Error::Config {
                    message: format!("budget.{field} must not be negative (got {value})"),
                });
            }
        }

        if self.llm.timeout_secs == 0 {
            return Err(Error::Config {
                message: "llm.timeout_secs must be greater than zero".to_string(),
            });
        }

        if budget.max_spendable() == 0 {
            tracing::warn!(
                "Savings goal and fixed costs consume the whole income; every allocation will be zero"
            );
        }

        Ok(())
    }
}

/// Loads application configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A budget figure is negative
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    AppConfig::from_toml_str(&contents)
}

/// Loads configuration from `CONFIG_PATH`, falling back to ./config.toml
///
/// # Errors
/// Same as [`load_config`].
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [budget]
            monthly_income = 4000
            savings_goal = 800
            fixed_costs = 1500

            [llm]
            base_url = "http://localhost:11434/v1"
            model = "llama3.2"
            timeout_secs = 15

            [calendar]
            max_results = 50
        "#;

        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.budget.max_spendable(), 1700);
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.llm.timeout_secs, 15);
        assert_eq!(config.llm.max_tokens, None);
        assert_eq!(config.calendar.max_results, 50);
        assert_eq!(config.calendar.base_url, DEFAULT_CALENDAR_BASE_URL);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.budget, BudgetConfig::default());
        assert_eq!(config.llm.base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.calendar.max_results, 250);
    }

    #[test]
    fn test_max_spendable_floors_at_zero() {
        let budget = BudgetConfig {
            monthly_income: 1000,
            savings_goal: 900,
            fixed_costs: 300,
        };
        assert_eq!(budget.max_spendable(), 0);
    }

    #[test]
    fn test_max_spendable_saturates_on_extreme_values() {
        let deep_debt = BudgetConfig {
            monthly_income: i64::MIN,
            savings_goal: i64::MAX,
            fixed_costs: i64::MAX,
        };
        assert_eq!(deep_debt.max_spendable(), 0);

        let windfall = BudgetConfig {
            monthly_income: i64::MAX,
            savings_goal: 0,
            fixed_costs: i64::MIN,
        };
        assert_eq!(windfall.max_spendable(), i64::MAX);
    }

    #[test]
    fn test_negative_budget_rejected() {
        let result = AppConfig::from_toml_str("[budget]\nsavings_goal = -5\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = AppConfig::from_toml_str("[llm]\ntimeout_secs = 0\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let result = AppConfig::from_toml_str("[budget\nmonthly_income = 1");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("definitely/not/here/config.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
