use budget_streak::{
    BudgetService,
    calendar::GoogleCalendarSource,
    config::{self, database},
    core::allocator::BudgetAllocator,
    errors::{Error, Result},
    llm::OpenAiBackend,
};
use chrono::Local;
use dotenvy::dotenv;
use std::{env, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_USER_ID: &str = "default";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load config.toml
    let app_config = config::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!(
        "Monthly spendable cap is {}",
        app_config.budget.max_spendable()
    );

    // 4. Initialize database
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Collaborators; credentials come from the environment, never from config.toml
    let api_key = env::var("OPENROUTER_API_KEY")
        .inspect_err(|e| error!("OPENROUTER_API_KEY not found: {}", e))
        .map_err(Error::EnvVar)?;
    let backend = OpenAiBackend::from_config(&app_config.llm, Some(api_key))?;
    let allocator = BudgetAllocator::new(
        Arc::new(backend),
        Duration::from_secs(app_config.llm.timeout_secs),
    )
    .with_budget_context(app_config.budget)
    .with_max_tokens(app_config.llm.max_tokens);

    let access_token = env::var("GOOGLE_ACCESS_TOKEN")
        .inspect_err(|e| error!("GOOGLE_ACCESS_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;
    let source = GoogleCalendarSource::from_config(&app_config.calendar, access_token)?;

    // 6. One sync pass for today
    let user_id = env::var("BUDGET_USER_ID").unwrap_or_else(|_| DEFAULT_USER_ID.to_string());
    let service = BudgetService::new(db, allocator, app_config.budget);
    let report = service
        .sync_from_source(
            &source,
            &user_id,
            Local::now().date_naive(),
            app_config.calendar.max_results,
        )
        .await
        .inspect_err(|e| error!("Sync failed (retryable: {}): {}", e.is_retryable(), e))?;

    info!(
        "Sync done: {} removed, {} rescheduled, {} added, cap {}",
        report.removed.len(),
        report.rescheduled.len(),
        report.added.len(),
        report.max_spendable
    );
    for allocation in &report.allocations {
        info!(
            "{} -> {} ({})",
            allocation.title, allocation.predicted_budget, allocation.reasoning
        );
    }

    Ok(())
}
