mod api;
mod config;
mod error;
mod models;
mod services;

use crate::api::{AppState, SpotifyState};
use crate::config::Config;
use crate::services::{
    AuthService, LexiconAnalyzer, LibraryPager, MoodJournal, MoodMapper, PgCredentialStore,
    PlaylistOrchestrator, Recommender, SpotifyClient, SpotifyService, TokenManager, UserService,
};
use axum::http::{header, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Connect to database
    let db = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db)
        .await?;
    tracing::info!("Database migrations completed");

    // Initialize services
    let spotify = match config.spotify.clone() {
        Some(credentials) => {
            let client = Arc::new(SpotifyClient::new(&config, credentials)?);
            let tokens = Arc::new(TokenManager::new(
                Arc::new(PgCredentialStore::new(db.clone())),
                client.clone(),
                config.token_refresh_margin,
            ));
            let service = Arc::new(SpotifyService::new(client, tokens, config.upstream_timeout));
            let library = Arc::new(LibraryPager::new(
                service.clone(),
                config.library_page_size,
                config.library_fetch_budget,
            ));
            tracing::info!("Spotify integration enabled");

            Some(SpotifyState {
                playlists: Arc::new(PlaylistOrchestrator::new(service.clone())),
                recommender: Arc::new(Recommender::new(service.clone(), library.clone())),
                library,
                service,
            })
        }
        None => None,
    };

    let app_state = Arc::new(AppState {
        auth_service: Arc::new(AuthService::new(&config)),
        users: Arc::new(UserService::new(db.clone())),
        journal: Arc::new(MoodJournal::new(db.clone())),
        sentiment: Arc::new(LexiconAnalyzer::new()),
        mapper: MoodMapper::new(),
        spotify,
        client_url: config.client_url.clone(),
    });

    // Build router
    let app = api::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.cors_origins));

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `LOG_FORMAT=json` for structured output, human-readable otherwise.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,moodwave=debug,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS allows any origin");
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}
