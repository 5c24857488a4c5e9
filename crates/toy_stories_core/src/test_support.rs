//! In-memory fakes for the ports, shared by the unit tests of this crate.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::ports::{
    AiResult, BackgroundRemover, BlobObject, BlobStore, DocumentKey, DocumentStore, FetchedImage,
    GenerationRequest, GenerativeAiService, ImageFetcher, KeyValueStore, PortError, PortResult,
    PutOptions, SpeechSynthesizer, StoredDocument,
};

/// Answers requests from a queue; with an empty queue it never answers.
pub struct ScriptedAi {
    responses: Mutex<VecDeque<AiResult<Value>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedAi {
    pub fn new(responses: Vec<AiResult<Value>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeAiService for ScriptedAi {
    async fn generate(&self, request: GenerationRequest) -> AiResult<Value> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<(BlobObject, Bytes, PutOptions)>>,
    failing: AtomicBool,
}

impl MemoryBlobStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    pub fn pathnames(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(object, _, _)| object.pathname.clone())
            .collect()
    }

    pub fn body(&self, pathname: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(object, _, _)| object.pathname == pathname)
            .map(|(_, body, _)| body.clone())
    }

    pub fn options(&self, pathname: &str) -> Option<PutOptions> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(object, _, _)| object.pathname == pathname)
            .map(|(_, _, options)| options.clone())
    }

    fn check(&self) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("blob store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, pathname: &str, body: Bytes, options: PutOptions) -> PortResult<String> {
        self.check()?;
        let url = format!("https://blob.test/{pathname}");
        let object = BlobObject {
            url: url.clone(),
            pathname: pathname.to_string(),
            size: body.len() as u64,
            uploaded_at: None,
        };
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|(existing, _, _)| existing.pathname != pathname);
        objects.push((object, body, options));
        Ok(url)
    }

    async fn list(&self, prefix: &str) -> PortResult<Vec<BlobObject>> {
        self.check()?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(object, _, _)| object.pathname.starts_with(prefix))
            .map(|(object, _, _)| object.clone())
            .collect())
    }

    async fn get(&self, url: &str) -> PortResult<Bytes> {
        self.check()?;
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(object, _, _)| object.url == url)
            .map(|(_, body, _)| body.clone())
            .ok_or_else(|| PortError::NotFound(url.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<(String, DocumentKey), StoredDocument>>,
}

impl MemoryDocumentStore {
    pub fn insert_raw(&self, owner: &str, key: DocumentKey, body: &str) {
        self.documents.lock().unwrap().insert(
            (owner.to_string(), key),
            StoredDocument {
                body: body.to_string(),
                version: 1,
            },
        );
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self, owner: &str, key: DocumentKey) -> PortResult<Option<StoredDocument>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(&(owner.to_string(), key))
            .cloned())
    }

    async fn replace(
        &self,
        owner: &str,
        key: DocumentKey,
        body: &str,
        expected_version: Option<u64>,
    ) -> PortResult<u64> {
        let mut documents = self.documents.lock().unwrap();
        let slot = (owner.to_string(), key);
        let current = documents.get(&slot).map(|d| d.version).unwrap_or(0);
        if let Some(expected) = expected_version {
            if expected != current {
                return Err(PortError::Conflict(format!(
                    "{} is at version {current}, expected {expected}",
                    key.as_str()
                )));
            }
        }
        let version = current + 1;
        documents.insert(
            slot,
            StoredDocument {
                body: body.to_string(),
                version,
            },
        );
        Ok(version)
    }

    async fn clear(&self, owner: &str) -> PortResult<()> {
        self.documents
            .lock()
            .unwrap()
            .retain(|(doc_owner, _), _| doc_owner != owner);
        Ok(())
    }
}

/// Serves the same image for every URL, or fails every download. Local
/// copies are only recorded.
pub struct StaticFetcher {
    image: Option<Bytes>,
    fetched: Mutex<Vec<String>>,
    kept: Mutex<Vec<Option<String>>>,
}

impl StaticFetcher {
    pub fn serving(image: Vec<u8>) -> Self {
        Self {
            image: Some(Bytes::from(image)),
            fetched: Mutex::new(Vec::new()),
            kept: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            image: None,
            fetched: Mutex::new(Vec::new()),
            kept: Mutex::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// The file name hint of every copy kept so far.
    pub fn kept(&self) -> Vec<Option<String>> {
        self.kept.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> PortResult<FetchedImage> {
        self.fetched.lock().unwrap().push(url.to_string());
        match &self.image {
            Some(bytes) => Ok(FetchedImage {
                bytes: bytes.clone(),
                mime_type: "image/png".to_string(),
            }),
            None => Err(PortError::Unexpected(format!("cannot download {url}"))),
        }
    }

    async fn keep_copy(&self, _image: &FetchedImage, file_name: Option<&str>) -> PortResult<PathBuf> {
        let mut kept = self.kept.lock().unwrap();
        kept.push(file_name.map(str::to_string));
        Ok(PathBuf::from(format!("copy-{}.png", kept.len())))
    }
}

/// Returns a fixed cut-out, or fails every request.
pub struct StaticRemover {
    cutout: Option<Bytes>,
    calls: Mutex<Vec<String>>,
}

impl StaticRemover {
    pub fn serving(cutout: Vec<u8>) -> Self {
        Self {
            cutout: Some(Bytes::from(cutout)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            cutout: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundRemover for StaticRemover {
    async fn remove_background(&self, image_url: &str) -> PortResult<Bytes> {
        self.calls.lock().unwrap().push(image_url.to_string());
        self.cutout
            .clone()
            .ok_or_else(|| PortError::Unexpected("background removal failed".into()))
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryKeyValueStore {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn set(&self, key: &str, value: Value) -> PortResult<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

/// Returns the text as audio bytes; words listed in `broken` fail.
pub struct EchoSpeech {
    pub broken: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl EchoSpeech {
    pub fn new(broken: &[&str]) -> Self {
        Self {
            broken: broken.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for EchoSpeech {
    async fn synthesize(&self, text: &str, _language_code: &str) -> PortResult<Vec<u8>> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.broken.iter().any(|b| b == text) {
            return Err(PortError::Unexpected(format!("no voice for {text}")));
        }
        Ok(text.as_bytes().to_vec())
    }

    fn voice_name(&self) -> String {
        "echo".to_string()
    }
}

/// A small PNG for pipeline tests.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([20, 20, 20]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .unwrap();
    cursor.into_inner()
}
