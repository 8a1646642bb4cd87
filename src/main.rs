use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use bhajan_service::assets::UploadCoordinator;
use bhajan_service::config::Settings;
use bhajan_service::db::PgRepository;
use bhajan_service::environment::Environment;
use bhajan_service::lifecycle::Lifecycle;
use bhajan_service::routes;
use bhajan_service::store::S3Store;
use bhajan_service::urls::Urls;
use log::{error, info, initialize_logger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    #[cfg(feature = "env_logging")]
    let _guard = log::initialize_env_logger().map_err(|e| e as Box<dyn Error>)?;

    let logger = Arc::new(initialize_logger());

    let settings = Settings::from_env().map_err(|e| {
        error!(logger, "Invalid configuration"; "error" => %e);
        e
    })?;

    let address = SocketAddr::new(settings.host, settings.port);
    info!(logger, "Starting..."; "address" => %address, "route_prefix" => &settings.route_prefix);

    let store = Arc::new(S3Store::from_settings(&settings.s3)?);

    info!(logger, "Creating database pool...");
    let pool = sqlx::postgres::PgPool::connect(&settings.db_connection_string).await?;
    let repository = Arc::new(PgRepository::new(pool));

    let coordinator = UploadCoordinator::new(
        store,
        settings.upload_timeout,
        settings.delete_timeout,
        logger.clone(),
    );
    let lifecycle = Arc::new(Lifecycle::new(repository, coordinator, logger.clone()));
    let urls = Arc::new(Urls::new(settings.base_url.clone(), &settings.route_prefix));

    let environment = Environment::new(logger.clone(), lifecycle, urls, settings.limits);
    let routes = routes::make_routes(environment);

    let shutdown = {
        let logger = logger.clone();

        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(logger, "Failed to listen for Ctrl-C"; "error" => %e);
                // without a signal handler, run until killed
                futures::future::pending::<()>().await;
            }

            info!(logger, "Received Ctrl-C; shutting down...");
        }
    };

    let (bound, server) = warp::serve(routes).bind_with_graceful_shutdown(address, shutdown);
    info!(logger, "Listening"; "address" => %bound);

    server.await;

    info!(logger, "Exiting gracefully...");

    Ok(())
}
