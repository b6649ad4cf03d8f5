//! Content-addressed image cache
//!
//! Requests are keyed by the encoded descriptor (resolved URL plus hints).
//! A request that hits an existing entry gets the entry's id back and
//! nothing is fetched, unless the decoder reported hints that differ from
//! the ones requested. A miss allocates the next id, replaces the entry and
//! queues a decode. Queued decodes only run when the session settles, never
//! inside the call that queued them.

pub mod descriptor;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use tracing::{debug, warn};

use crate::transport::Transport;

pub use descriptor::{ImageDescriptor, ImageSpec};

/// Render-ready image payload. Opaque to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dither: Option<String>,
}

/// Delivered to the requester once a decode completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReady {
    pub id: u32,
    pub url: String,
}

pub type ReadyCallback = Box<dyn FnOnce(ImageReady)>;

/// One cached image
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: u32,
    pub descriptor: ImageDescriptor,
    pub decoded: Option<DecodedImage>,
}

impl ImageRecord {
    pub fn url(&self) -> &str {
        &self.descriptor.url
    }
}

/// Fetches and decodes images. `None` means the requester is never called back.
#[async_trait(?Send)]
pub trait ImageLoader {
    async fn load(&self, descriptor: &ImageDescriptor) -> Option<DecodedImage>;
}

/// Loads raw bytes through a `Transport`; decoding is left to the renderer
pub struct TransportImageLoader {
    transport: Rc<dyn Transport>,
}

impl TransportImageLoader {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait(?Send)]
impl ImageLoader for TransportImageLoader {
    async fn load(&self, descriptor: &ImageDescriptor) -> Option<DecodedImage> {
        match self.transport.fetch(&descriptor.url).await {
            Ok(bytes) => Some(DecodedImage {
                bytes,
                width: descriptor.width,
                height: descriptor.height,
                dither: descriptor.dither.clone(),
            }),
            Err(e) => {
                warn!(target: "images", "Failed to load {}: {}", descriptor.url, e);
                None
            }
        }
    }
}

/// Result of one queued decode
pub struct DecodeCompletion {
    pub hash: String,
    pub id: u32,
    pub url: String,
    pub decoded: Option<DecodedImage>,
    pub on_ready: Option<ReadyCallback>,
}

impl fmt::Debug for DecodeCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeCompletion")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("decoded", &self.decoded.is_some())
            .finish()
    }
}

pub type PendingDecodes = FuturesUnordered<LocalBoxFuture<'static, DecodeCompletion>>;

pub struct ResourceCache {
    loader: Rc<dyn ImageLoader>,
    entries: HashMap<String, ImageRecord>,
    next_id: u32,
    pending: PendingDecodes,
}

impl ResourceCache {
    pub fn new(loader: Rc<dyn ImageLoader>) -> Self {
        Self {
            loader,
            entries: HashMap::new(),
            next_id: 1,
            pending: FuturesUnordered::new(),
        }
    }

    /// Return the id for `descriptor`, queueing a decode on a miss.
    ///
    /// `descriptor.url` must already be resolved.
    pub fn resolve(
        &mut self,
        descriptor: ImageDescriptor,
        force_reset: bool,
        on_ready: Option<ReadyCallback>,
    ) -> u32 {
        let hash = descriptor.encode();

        if let Some(cached) = self.entries.get(&hash) {
            let conflicts = descriptor.conflicts_with(&cached.descriptor);
            if !conflicts && !force_reset {
                debug!(target: "images", "Cache hit for {} (id {})", hash, cached.id);
                return cached.id;
            }
            if conflicts {
                debug!(target: "images", "Hints for {} differ from cached id {}, reloading", hash, cached.id);
            }
            if force_reset {
                debug!(target: "images", "Forced reload of {} (was id {})", hash, cached.id);
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        debug!(target: "images", "Allocated id {} for {}", id, hash);

        self.entries.insert(
            hash.clone(),
            ImageRecord {
                id,
                descriptor: descriptor.clone(),
                decoded: None,
            },
        );

        let loader = Rc::clone(&self.loader);
        self.pending.push(Box::pin(async move {
            let decoded = loader.load(&descriptor).await;
            DecodeCompletion {
                hash,
                id,
                url: descriptor.url,
                decoded,
                on_ready,
            }
        }));

        id
    }

    /// Hand the queued decodes to the caller to drive
    pub fn take_pending(&mut self) -> PendingDecodes {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Store a finished decode. Returns `false` if the entry was replaced meanwhile.
    ///
    /// Hints reported by the decoder replace the requested ones, so a later
    /// request for the original hints conflicts and reloads.
    pub fn complete(&mut self, completion: &DecodeCompletion) -> bool {
        match self.entries.get_mut(&completion.hash) {
            Some(record) if record.id == completion.id => {
                if let Some(decoded) = &completion.decoded {
                    let descriptor = &mut record.descriptor;
                    descriptor.width = decoded.width.or(descriptor.width);
                    descriptor.height = decoded.height.or(descriptor.height);
                    descriptor.dither = decoded.dither.clone().or(descriptor.dither.take());
                }
                record.decoded = completion.decoded.clone();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, hash: &str) -> Option<&ImageRecord> {
        self.entries.get(hash)
    }

    pub fn by_id(&self, id: u32) -> Option<&ImageRecord> {
        self.entries.values().find(|record| record.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("entries", &self.entries.len())
            .field("next_id", &self.next_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingLoader {
        loads: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl ImageLoader for CountingLoader {
        async fn load(&self, descriptor: &ImageDescriptor) -> Option<DecodedImage> {
            self.loads.set(self.loads.get() + 1);
            Some(DecodedImage {
                bytes: descriptor.url.as_bytes().to_vec(),
                width: descriptor.width,
                height: descriptor.height,
                dither: None,
            })
        }
    }

    /// Decodes at most `max_width` pixels wide
    struct ClampingLoader {
        max_width: u32,
    }

    #[async_trait(?Send)]
    impl ImageLoader for ClampingLoader {
        async fn load(&self, descriptor: &ImageDescriptor) -> Option<DecodedImage> {
            Some(DecodedImage {
                bytes: Vec::new(),
                width: descriptor.width.map(|w| w.min(self.max_width)),
                height: descriptor.height,
                dither: None,
            })
        }
    }

    fn cache() -> (Rc<CountingLoader>, ResourceCache) {
        let loader = Rc::new(CountingLoader::default());
        let cache = ResourceCache::new(Rc::clone(&loader) as Rc<dyn ImageLoader>);
        (loader, cache)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let (_, mut cache) = cache();
        assert_eq!(cache.resolve(ImageDescriptor::new("a.png"), false, None), 1);
        assert_eq!(cache.resolve(ImageDescriptor::new("b.png"), false, None), 2);
        assert_eq!(
            cache.resolve(ImageDescriptor::new("a.png").with_dither("none"), false, None),
            3
        );
    }

    #[test]
    fn test_hit_while_in_flight_reuses_id() {
        let (_, mut cache) = cache();
        let first = cache.resolve(ImageDescriptor::new("a.png"), false, None);
        let second = cache.resolve(ImageDescriptor::new("a.png"), false, None);
        assert_eq!(first, second);
        assert_eq!(cache.pending_count(), 1);
    }

    #[test]
    fn test_force_reset_allocates_new_id() {
        let (_, mut cache) = cache();
        let first = cache.resolve(ImageDescriptor::new("a.png"), false, None);
        let second = cache.resolve(ImageDescriptor::new("a.png"), true, None);
        assert_ne!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a.png").map(|r| r.id), Some(second));
        assert_eq!(cache.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_decodes_run_only_when_driven() {
        let (loader, mut cache) = cache();
        let id = cache.resolve(ImageDescriptor::new("a.png").with_size(4, 4), false, None);
        assert_eq!(loader.loads.get(), 0);

        let mut pending = cache.take_pending();
        let completion = pending.next().await.unwrap();
        assert_eq!(loader.loads.get(), 1);
        assert_eq!(completion.id, id);
        assert!(cache.complete(&completion));
        assert!(cache.by_id(id).unwrap().decoded.is_some());
        assert_eq!(cache.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_decoded_hints_that_differ_force_reload() {
        let mut cache = ResourceCache::new(Rc::new(ClampingLoader { max_width: 8 }));
        let wide = ImageDescriptor::parse("a.png#width:10");
        let first = cache.resolve(wide.clone(), false, None);

        let completion = cache.take_pending().next().await.unwrap();
        assert!(cache.complete(&completion));
        assert_eq!(cache.by_id(first).unwrap().descriptor.width, Some(8));

        let second = cache.resolve(wide, false, None);
        assert_ne!(first, second);

        // Hints the decoder kept still hit
        let narrow = ImageDescriptor::parse("b.png#width:6");
        let third = cache.resolve(narrow.clone(), false, None);
        let completion = cache.take_pending().collect::<Vec<_>>().await;
        for c in &completion {
            cache.complete(c);
        }
        assert_eq!(cache.resolve(narrow, false, None), third);
    }

    #[tokio::test]
    async fn test_replaced_entry_ignores_stale_completion() {
        let (_, mut cache) = cache();
        cache.resolve(ImageDescriptor::new("a.png"), false, None);
        cache.resolve(ImageDescriptor::new("a.png"), true, None);

        let completions: Vec<DecodeCompletion> = cache.take_pending().collect().await;
        let stored: Vec<bool> = completions.iter().map(|c| cache.complete(c)).collect();
        assert_eq!(stored.iter().filter(|s| **s).count(), 1);
    }
}
