pub mod blob;
pub mod db;
pub mod edge_config;
pub mod fetch;
pub mod gemini;
pub mod replicate;
pub mod tts;

pub use blob::VercelBlobAdapter;
pub use db::SqliteDocumentStore;
pub use edge_config::EdgeConfigAdapter;
pub use fetch::HttpImageFetcher;
pub use gemini::GeminiAdapter;
pub use replicate::ReplicateBackgroundRemover;
pub use tts::OpenAiTtsAdapter;
