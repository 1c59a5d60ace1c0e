// src/main.rs

use dotenvy::dotenv;
use examdesk::config::Config;
use examdesk::routes;
use examdesk::state::AppState;
use examdesk::utils::notify::LogNotifier;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    // Seed the config singleton and the admin user
    if let Err(e) = seed(&pool, &config).await {
        tracing::error!("Failed to seed database: {:?}", e);
    }

    // Create AppState
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        notifier: Arc::new(LogNotifier),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], 5000));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    // Start the server
    axum::serve(listener, app).await.unwrap();
}

/// Creates the exam-config singleton on first boot and, when ADMIN_EMAIL is
/// set, an admin account. Both are no-ops when the rows already exist.
async fn seed(pool: &PgPool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let config_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exam_config")
        .fetch_one(pool)
        .await?;

    if config_exists == 0 {
        tracing::info!("No exam config found, creating default config");
        sqlx::query("INSERT INTO exam_config DEFAULT VALUES")
            .execute(pool)
            .await?;
    }

    if let Some(admin_email) = &config.admin_email {
        let admin_email = admin_email.trim().to_lowercase();
        let admin_exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE role = 'ADMIN'",
        )
        .fetch_one(pool)
        .await?;

        if admin_exists == 0 {
            tracing::info!("Seeding admin user: {}", admin_email);
            sqlx::query("INSERT INTO users (email, name, role) VALUES ($1, 'Admin', 'ADMIN')")
                .bind(&admin_email)
                .execute(pool)
                .await?;
            tracing::info!("Admin user created successfully.");
        }
    }

    Ok(())
}
