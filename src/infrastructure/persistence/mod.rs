use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::AnyPool;
use std::str::FromStr;

pub mod memory_dead_letter;
pub mod memory_delivery_queue;
pub mod memory_retry_configuration;
pub mod sqlite_delivery_queue;

pub use memory_dead_letter::InMemoryDeadLetterSink;
pub use memory_delivery_queue::InMemoryDeliveryQueueRepository;
pub use memory_retry_configuration::InMemoryRetryConfigurationRepository;
pub use sqlite_delivery_queue::SqliteDeliveryQueueRepository;

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        // Ensure drivers are installed for AnyPool
        sqlx::any::install_default_drivers();

        let connect_options = AnyConnectOptions::from_str(database_url)?;
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        // Every connection to an in-memory database sees its own empty database,
        // so those get exactly one connection that is never recycled.
        let pool_options = if in_memory {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(10).min_connections(1)
        };

        let pool = pool_options.connect_with(connect_options).await?;

        if database_url.starts_with("sqlite") {
            if !in_memory {
                sqlx::query("PRAGMA journal_mode = WAL")
                    .execute(&pool)
                    .await?;
            }
            sqlx::query("PRAGMA busy_timeout = 5000")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA synchronous = NORMAL")
                .execute(&pool)
                .await?;
        }

        tracing::info!("Database connection established (in_memory: {})", in_memory);
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}
