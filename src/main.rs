use actix_web::{web, App, HttpServer, middleware::Compress};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use stackit::config::{validate_env, ServerConfig};
use stackit::openapi::ApiDoc;
use stackit::rate_limit::RateLimiterFacade;
use stackit::repo::Repo;
use stackit::{config, AppState};
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let problems = validate_env();
    if !problems.is_empty() {
        for p in &problems {
            tracing::error!("{p}");
        }
        anyhow::bail!("invalid environment; copy .env.example to .env and configure it");
    }

    let settings = ServerConfig::from_env();
    info!("Bootstrapping StackIt server");
    info!("Frontend URL: {}", settings.frontend_url);

    let repo = build_repo(&settings).await?;
    let mut state = AppState::new(repo);
    if let Some(limiter) = RateLimiterFacade::from_env() {
        info!(cfg = ?limiter.cfg, "Posting rate limits enabled");
        state = state.with_rate_limiter(limiter);
    }

    let openapi = ApiDoc::openapi();
    let frontend_url = settings.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PATCH", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    })
    .bind((settings.host.as_str(), settings.port))?;

    info!("Listening on http://{}:{}", settings.host, settings.port);

    server.run().await?;
    Ok(())
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(settings: &ServerConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use stackit::repo::inmem::InMemRepo;
    info!(data_dir = %settings.data_dir.display(), "Using in-memory repository backend");
    Ok(Arc::new(InMemRepo::with_data_dir(settings.data_dir.clone())))
}

#[cfg(feature = "postgres-store")]
async fn build_repo(settings: &ServerConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use stackit::repo::pg::PgRepo;
    let url = settings
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
    let repo = PgRepo::connect(url).await?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}
