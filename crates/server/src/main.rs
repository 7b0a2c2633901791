//! Watchlog maintenance worker.
//!
//! Runs migrations, then periodically finalizes account deletions whose
//! grace period has run out.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchlog_common::Config;
use watchlog_core::{
    AccountService, Argon2CredentialVerifier, DispositionExecutor, DispositionPlanner,
    EligibilityChecker, LifecycleSettings,
};
use watchlog_db::repositories::{DispositionPlanRepository, GroupRepository, UserRepository};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Wire the lifecycle services over one connection pool.
fn account_service(db: Arc<sea_orm::DatabaseConnection>, settings: LifecycleSettings) -> AccountService {
    let user_repo = UserRepository::new(Arc::clone(&db));
    let group_repo = GroupRepository::new(Arc::clone(&db));
    let plan_repo = DispositionPlanRepository::new(db);

    let eligibility = EligibilityChecker::new(user_repo.clone(), group_repo.clone(), settings);
    let planner = DispositionPlanner::new(user_repo.clone(), group_repo.clone(), eligibility.clone());
    let executor = DispositionExecutor::new(
        user_repo.clone(),
        group_repo.clone(),
        plan_repo,
        eligibility,
    );
    let credentials = Arc::new(Argon2CredentialVerifier::new(user_repo.clone()));

    AccountService::new(
        user_repo,
        group_repo,
        planner,
        executor,
        credentials,
        settings,
    )
}

/// Finalize due deletions on a fixed interval until shutdown.
async fn run_sweeper(service: AccountService, every: Duration, batch_size: u64) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match service
            .finalize_due_deletions(chrono::Utc::now(), batch_size)
            .await
        {
            Ok(report) => tracing::debug!(
                finalized = report.finalized,
                failed = report.failed,
                "Sweep completed"
            ),
            Err(e) => tracing::error!(error = %e, "Deletion sweep failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "watchlog=debug".into());
    let json = config.worker.json_logs;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("Starting watchlog worker...");

    // Connect to database
    let db = watchlog_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    watchlog_db::migrate(&db).await?;
    info!("Migrations completed");

    let settings = LifecycleSettings::from(&config.lifecycle);
    let service = account_service(Arc::new(db), settings);

    info!(
        interval_secs = config.worker.sweep_interval_secs,
        batch_size = config.worker.sweep_batch_size,
        grace_days = settings.deletion_grace_days,
        "Deletion sweeper started"
    );

    tokio::select! {
        () = run_sweeper(
            service,
            Duration::from_secs(config.worker.sweep_interval_secs.max(1)),
            config.worker.sweep_batch_size,
        ) => {},
        () = shutdown_signal() => {},
    }

    info!("Worker shut down");
    Ok(())
}
