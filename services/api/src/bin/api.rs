//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        EdgeConfigAdapter, GeminiAdapter, HttpImageFetcher, OpenAiTtsAdapter,
        ReplicateBackgroundRemover, SqliteDocumentStore, VercelBlobAdapter,
    },
    config::Config,
    error::ApiError,
    web::{ai, cloud, rest, rest::ApiDoc, state::AppState, stories},
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    routing::{get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use toy_stories_core::{
    mirror::log_reports, AudioManifest, BackgroundMirror, BackgroundRemover, BlobStore,
    ClientPersistence, CloudBackup, ImageFetcher, ImageProcessor, KeyValueStore,
    PronunciationCache, SpeechSynthesizer, StoryGenerator, ToyOnboarding,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Document Store & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let document_store = Arc::new(SqliteDocumentStore::new(db_pool));
    info!("Running database migrations...");
    document_store.run_migrations().await?;
    info!("Database migrations complete.");
    let persistence = ClientPersistence::new(document_store);

    // --- 3. Initialize Vendor Adapters ---
    let gemini = Arc::new(GeminiAdapter::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    ));
    let storage: Arc<dyn BlobStore> = Arc::new(VercelBlobAdapter::new(
        config.blob_token.clone(),
        config.blob_base_url.clone(),
    ));
    let key_value: Option<Arc<dyn KeyValueStore>> = match &config.edge_config {
        Some(settings) => Some(Arc::new(EdgeConfigAdapter::new(settings.clone()))),
        None => {
            warn!("Edge Config is not configured; profile saves will only reach blob storage.");
            None
        }
    };
    let fetcher: Arc<dyn ImageFetcher> =
        Arc::new(HttpImageFetcher::new(config.download_dir.clone()));

    let remover: Option<Arc<dyn BackgroundRemover>> = match &config.replicate {
        Some(settings) => Some(Arc::new(ReplicateBackgroundRemover::new(settings.clone()))),
        None => {
            warn!("REPLICATE_API_TOKEN is not set; soundboard bitmaps keep the photo background.");
            None
        }
    };

    let speech: Option<Arc<dyn SpeechSynthesizer>> = match &config.openai_api_key {
        Some(api_key) => {
            let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
            let adapter = OpenAiTtsAdapter::new(client, SpeechModel::Tts1, &config.tts_voice)
                .ok_or_else(|| {
                    ApiError::Internal(format!(
                        "Invalid TTS voice specified in config: '{}'",
                        config.tts_voice
                    ))
                })?;
            Some(Arc::new(adapter))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; pronunciations are disabled.");
            None
        }
    };

    // --- 4. Build the Core Services ---
    let processor = ImageProcessor::new(config.bitmap_size)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let (mirror, mirror_reports) =
        BackgroundMirror::new(storage.clone(), processor, config.mirror_timeout);
    tokio::spawn(log_reports(mirror_reports));

    let manifest = match AudioManifest::load(&config.audio_manifest_path).await {
        Ok(manifest) => {
            info!(
                "Loaded {} audio files from {}",
                manifest.entries().len(),
                config.audio_manifest_path.display()
            );
            manifest
        }
        Err(e) => {
            warn!(
                "Could not read the audio manifest at {}: {}. Audio matching will fail.",
                config.audio_manifest_path.display(),
                e
            );
            AudioManifest::default()
        }
    };

    let onboarding = Arc::new(ToyOnboarding::new(
        gemini.clone(),
        fetcher.clone(),
        persistence.clone(),
        mirror.clone(),
        Arc::new(manifest),
        config.default_language.clone(),
    ));
    let story_generator = Arc::new(StoryGenerator::new(
        gemini.clone(),
        persistence.clone(),
        mirror.clone(),
        config.default_language.clone(),
    ));
    let backup = Arc::new(CloudBackup::new(
        storage.clone(),
        key_value,
        mirror,
        fetcher,
        remover,
    ));
    let pronunciations =
        speech.map(|tts| Arc::new(PronunciationCache::new(tts, storage.clone())));

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        ai: gemini,
        persistence,
        onboarding,
        stories: story_generator,
        backup,
        pronunciations,
    });

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {e}")))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route(
            "/api/user-data",
            get(rest::get_user_data_handler)
                .put(rest::update_user_data_handler)
                .delete(rest::reset_user_data_handler),
        )
        .route("/api/user-data/save", post(cloud::save_user_data_handler))
        .route("/api/download-image", post(rest::download_image_handler))
        .route("/api/toys/{key}/resume", post(rest::resume_toy_handler))
        .route(
            "/api/toys/{key}",
            put(rest::replace_toy_handler).delete(rest::delete_toy_handler),
        )
        .route("/api/selected-toys", put(rest::select_toys_handler))
        .route("/api/soundboard-prep", post(cloud::soundboard_prep_handler))
        .route("/api/gemini", post(ai::prompt_handler))
        .route("/api/gemini/get-toy-audio", post(ai::toy_audio_handler))
        .route("/api/gemini/create-story", post(stories::create_story_handler))
        .route("/api/translate", post(ai::translate_word_handler))
        .route("/api/pronunciations", post(ai::pronunciations_handler))
        .route("/api/stories", get(stories::list_stories_handler))
        .route("/api/stories/current", get(stories::current_story_handler))
        .route("/api/stories/cancel", post(stories::cancel_story_handler))
        .route("/api/stories/save", post(cloud::save_stories_handler))
        .route("/api/stories/translate", post(stories::translate_story_handler))
        .route("/api/demo-data/list", get(cloud::list_demo_data_handler))
        .route("/api/demo-data/fetch", post(cloud::fetch_demo_data_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
