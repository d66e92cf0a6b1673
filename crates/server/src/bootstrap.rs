use std::sync::Arc;
use std::time::Duration;

use expensey_core::config::{AppConfig, ConfigError, LoadOptions};
use expensey_core::currency::{CurrencyConverter, StaticRateTable};
use expensey_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

use crate::rates::HttpRateSource;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub converter: Arc<CurrencyConverter>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let converter = Arc::new(build_converter(&config));

    Ok(Application { config, db_pool, converter })
}

fn build_converter(config: &AppConfig) -> CurrencyConverter {
    let cache_ttl = Duration::from_secs(config.rates.cache_ttl_secs);

    match &config.rates.base_url {
        Some(base_url) => {
            info!(
                event_name = "system.bootstrap.rate_source_configured",
                correlation_id = "bootstrap",
                base_url = %base_url,
                "using HTTP currency rate source"
            );
            CurrencyConverter::new(Box::new(HttpRateSource::from_config(&config.rates)), cache_ttl)
        }
        None => {
            // Identity conversions still work; cross-currency submissions
            // will surface UpstreamUnavailable until a source is configured.
            warn!(
                event_name = "system.bootstrap.rate_source_missing",
                correlation_id = "bootstrap",
                "rates.base_url is not configured; cross-currency conversion is disabled"
            );
            CurrencyConverter::new(Box::new(StaticRateTable::default()), cache_ttl)
        }
    }
}

#[cfg(test)]
mod tests {
    use expensey_core::config::{ConfigOverrides, LoadOptions};
    use rust_decimal::Decimal;

    use crate::bootstrap::bootstrap;

    fn memory_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_and_applies_migrations() {
        let app = bootstrap(memory_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed against in-memory sqlite");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('company', 'employee', 'expense', 'approval_step')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected foundation tables to be available after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose baseline workflow tables");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn default_converter_handles_identity_conversion_only() {
        let app = bootstrap(memory_options("sqlite::memory:"))
            .await
            .expect("bootstrap should succeed");

        let amount = Decimal::new(10_000, 2);
        let converted =
            app.converter.convert(amount, "USD", "USD").await.expect("identity conversion");
        assert_eq!(converted, amount);

        let error = app.converter.convert(amount, "EUR", "USD").await;
        assert!(error.is_err(), "cross-currency conversion requires a configured source");

        app.db_pool.close().await;
    }
}
