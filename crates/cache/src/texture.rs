//! Multi-resolution texture cache.
//!
//! Each (document, page) keeps an ordered list of rasterized variants sorted
//! by scale, highest first, bounded by `max_textures_keep`. All mutations
//! happen under a single lock and advance the cache epoch, which consumers use
//! to notice that a texture they hold may no longer be the best one.
//!
//! With [`crate::FreeingStrategy::RefCounted`] every successful lookup takes a
//! reference that must be given back, either through [`TextureCache::release`]
//! or by dropping a [`TextureLease`]. An entry is freed when its count returns
//! to zero.

use crate::config::CacheConfig;
use crate::key::{CacheKey, Epoch, Scale};
use parking_lot::Mutex;
use pdf_desktop_render::{PageRef, PixelBuffer};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// Consumer contract violations. Only reachable in ref-counted mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("release of {0}, which is not cached")]
    UntrackedRelease(CacheKey),
    #[error("{0} released more times than it was acquired")]
    ReleaseUnderflow(CacheKey),
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of variants currently cached, across all pages
    pub texture_count: usize,

    /// Lookups that returned a variant
    pub hits: u64,

    /// Lookups on a page with nothing cached
    pub misses: u64,

    /// Variants inserted
    pub insertions: u64,

    /// Variants pushed out by the per-page capacity bound
    pub evictions: u64,

    /// Variants freed because their reference count returned to zero
    pub freed: u64,
}

#[derive(Debug)]
struct TextureEntry {
    id: u64,
    scale: Scale,
    buffer: Arc<PixelBuffer>,
    produced_at: Epoch,
    refs: usize,
}

#[derive(Default)]
struct CacheState {
    pages: HashMap<PageRef, Vec<TextureEntry>>,
    epoch: Epoch,
    next_id: u64,
    stats: CacheStats,
}

impl CacheState {
    /// Remove one variant, dropping the page list once it is empty.
    fn remove_at(&mut self, page: PageRef, index: usize) -> Option<TextureEntry> {
        let entries = self.pages.get_mut(&page)?;
        let entry = entries.remove(index);
        if entries.is_empty() {
            self.pages.remove(&page);
        }
        self.stats.texture_count -= 1;
        Some(entry)
    }

    /// Decrement the count of the variant at `index`, freeing it at zero.
    fn release_at(&mut self, key: CacheKey, index: usize) -> Result<(), CacheError> {
        let Some(entry) = self.pages.get_mut(&key.page).and_then(|e| e.get_mut(index)) else {
            return Err(CacheError::UntrackedRelease(key));
        };
        if entry.refs == 0 {
            return Err(CacheError::ReleaseUnderflow(key));
        }

        entry.refs -= 1;
        if entry.refs == 0 {
            self.remove_at(key.page, index);
            self.epoch = self.epoch.next();
            self.stats.freed += 1;
            tracing::trace!(%key, "freed texture after last release");
        }
        Ok(())
    }
}

/// A resolved lookup: the pixel buffer plus what it was rasterized at.
///
/// Cloning the buffer is cheap; the pixels stay owned by the cache until the
/// variant is evicted or freed and the last clone is dropped.
#[derive(Debug)]
pub struct TextureHandle {
    key: CacheKey,
    buffer: Arc<PixelBuffer>,
    stamp: Epoch,
    produced_at: Epoch,
    entry: u64,
}

impl TextureHandle {
    /// Key of the variant actually returned (its scale may differ from the
    /// requested one).
    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub fn page(&self) -> PageRef {
        self.key.page
    }

    /// Scale the buffer was rasterized at.
    pub fn scale(&self) -> Scale {
        self.key.scale
    }

    pub fn buffer(&self) -> &Arc<PixelBuffer> {
        &self.buffer
    }

    /// Cache epoch at the time of the lookup; pass to [`TextureCache::is_fresh`].
    pub fn stamp(&self) -> Epoch {
        self.stamp
    }

    /// Epoch at which the variant was inserted.
    pub fn produced_at(&self) -> Epoch {
        self.produced_at
    }

    /// Whether both handles point at the same cached variant.
    pub fn same_entry(&self, other: &TextureHandle) -> bool {
        self.entry == other.entry
    }

    /// Factor to draw this buffer with so it covers the page at `view_scale`.
    pub fn display_factor(&self, view_scale: f32) -> f32 {
        view_scale / self.key.scale.get()
    }
}

/// Texture cache shared between the worker and the interactive thread.
///
/// # Example
///
/// ```
/// use pdf_desktop_cache::{CacheConfig, CacheKey, Scale, TextureCache};
/// use pdf_desktop_render::{DocumentHandle, PageRef, PixelBuffer};
///
/// let cache = TextureCache::new(CacheConfig::default().with_max_textures_keep(2));
/// let page = PageRef::new(DocumentHandle::from_raw(1), 0);
///
/// for scale in [1.0, 2.0] {
///     let key = CacheKey::new(page, Scale::new(scale).unwrap());
///     cache.put(key, PixelBuffer::new(8, 8));
/// }
///
/// // The smallest cached scale that still covers the request wins.
/// let handle = cache.get(page, Scale::new(1.5).unwrap()).unwrap();
/// assert_eq!(handle.scale().get(), 2.0);
/// assert!(cache.is_fresh(handle.stamp()));
/// ```
pub struct TextureCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl TextureCache {
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            max_textures_keep: config.max_textures_keep.max(1),
            ..config
        };
        Self { config, state: Mutex::new(CacheState::default()) }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn ref_counted(&self) -> bool {
        self.config.is_ref_counted()
    }

    /// Insert a freshly rasterized variant.
    ///
    /// When the page is at capacity the variant at list position 0, i.e. the
    /// highest scale currently cached, is evicted first. The new variant goes
    /// before the first entry whose scale is not larger than its own. Returns
    /// the scale that was evicted, if any.
    pub fn put(&self, key: CacheKey, buffer: PixelBuffer) -> Option<Scale> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let produced_at = state.epoch.next();
        let id = state.next_id;
        state.next_id += 1;

        let entries = state.pages.entry(key.page).or_default();

        let evicted = if entries.len() >= self.config.max_textures_keep {
            let evicted = entries.remove(0);
            state.stats.evictions += 1;
            state.stats.texture_count -= 1;
            tracing::debug!(
                page = key.page.index,
                evicted = %evicted.scale,
                outstanding = evicted.refs,
                "evicted texture at capacity"
            );
            Some(evicted.scale)
        } else {
            None
        };

        let index = entries.iter().position(|e| e.scale <= key.scale).unwrap_or(entries.len());
        entries.insert(
            index,
            TextureEntry { id, scale: key.scale, buffer: Arc::new(buffer), produced_at, refs: 0 },
        );

        state.stats.insertions += 1;
        state.stats.texture_count += 1;
        state.epoch = produced_at;

        evicted
    }

    /// Look up the best variant for `requested`.
    ///
    /// Returns the variant with the smallest scale that is still at least
    /// `requested`, or the largest cached scale when every variant is smaller.
    /// `None` only when nothing is cached for the page. In ref-counted mode the
    /// returned variant gains a reference.
    pub fn get(&self, page: PageRef, requested: Scale) -> Option<TextureHandle> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(entries) = state.pages.get_mut(&page) else {
            state.stats.misses += 1;
            return None;
        };

        let mut chosen = 0;
        for (index, entry) in entries.iter().enumerate() {
            if entry.scale < requested {
                break;
            }
            chosen = index;
        }

        let entry = entries.get_mut(chosen)?;
        if self.ref_counted() {
            entry.refs += 1;
        }
        state.stats.hits += 1;

        Some(TextureHandle {
            key: CacheKey::new(page, entry.scale),
            buffer: Arc::clone(&entry.buffer),
            stamp: state.epoch,
            produced_at: entry.produced_at,
            entry: entry.id,
        })
    }

    /// Like [`TextureCache::get`], but the reference is given back when the
    /// returned lease is dropped.
    pub fn acquire(self: &Arc<Self>, page: PageRef, requested: Scale) -> Option<TextureLease> {
        let handle = self.get(page, requested)?;
        Some(TextureLease { cache: Arc::clone(self), handle, released: false })
    }

    /// Give back one reference to the variant at exactly `key`. No-op unless
    /// ref-counted.
    ///
    /// Releasing a key that is not cached, or one without outstanding
    /// references, is a consumer bug: it is logged, returned as an error, and
    /// panics in debug builds.
    pub fn release(&self, key: CacheKey) -> Result<(), CacheError> {
        if !self.ref_counted() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let index = state
            .pages
            .get(&key.page)
            .and_then(|entries| entries.iter().position(|e| e.scale == key.scale));

        let result = match index {
            Some(index) => state.release_at(key, index),
            None => Err(CacheError::UntrackedRelease(key)),
        };
        drop(state);

        result.map_err(contract_violation)
    }

    /// Give back the reference taken by the lookup that produced `handle`.
    ///
    /// If the variant was evicted in the meantime there is nothing left to
    /// release and this succeeds.
    pub fn release_handle(&self, handle: TextureHandle) -> Result<(), CacheError> {
        self.release_entry(handle.key, handle.entry)
    }

    fn release_entry(&self, key: CacheKey, entry: u64) -> Result<(), CacheError> {
        if !self.ref_counted() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let index = state
            .pages
            .get(&key.page)
            .and_then(|entries| entries.iter().position(|e| e.id == entry));

        let result = match index {
            Some(index) => state.release_at(key, index),
            None => {
                tracing::trace!(%key, "released texture was already evicted");
                Ok(())
            }
        };
        drop(state);

        result.map_err(contract_violation)
    }

    /// Whether any variant is cached for the page.
    pub fn has_any(&self, page: PageRef) -> bool {
        self.state.lock().pages.get(&page).is_some_and(|entries| !entries.is_empty())
    }

    /// Whether a variant at exactly this scale is cached.
    pub fn contains(&self, key: CacheKey) -> bool {
        self.state
            .lock()
            .pages
            .get(&key.page)
            .is_some_and(|entries| entries.iter().any(|e| e.scale == key.scale))
    }

    /// True while the cache has not changed since `stamp` was taken.
    pub fn is_fresh(&self, stamp: Epoch) -> bool {
        self.state.lock().epoch <= stamp
    }

    pub fn epoch(&self) -> Epoch {
        self.state.lock().epoch
    }

    /// Cached scales for a page, highest first.
    pub fn page_scales(&self, page: PageRef) -> Vec<Scale> {
        self.state
            .lock()
            .pages
            .get(&page)
            .map(|entries| entries.iter().map(|e| e.scale).collect())
            .unwrap_or_default()
    }

    /// Outstanding references on the variant at exactly `key`.
    pub fn ref_count(&self, key: CacheKey) -> Option<usize> {
        self.state
            .lock()
            .pages
            .get(&key.page)
            .and_then(|entries| entries.iter().find(|e| e.scale == key.scale))
            .map(|e| e.refs)
    }

    pub fn texture_count(&self) -> usize {
        self.state.lock().stats.texture_count
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn contract_violation(err: CacheError) -> CacheError {
    tracing::error!(%err, "texture cache contract violation");
    if cfg!(debug_assertions) {
        panic!("texture cache contract violation: {err}");
    }
    err
}

/// Scoped texture reference that releases itself on drop.
pub struct TextureLease {
    cache: Arc<TextureCache>,
    handle: TextureHandle,
    released: bool,
}

impl TextureLease {
    /// Release now and surface a contract violation instead of logging it.
    pub fn release(mut self) -> Result<(), CacheError> {
        self.released = true;
        self.cache.release_entry(self.handle.key, self.handle.entry)
    }
}

impl Deref for TextureLease {
    type Target = TextureHandle;

    fn deref(&self) -> &TextureHandle {
        &self.handle
    }
}

impl Drop for TextureLease {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.cache.release_entry(self.handle.key, self.handle.entry);
        }
    }
}

impl std::fmt::Debug for TextureLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureLease")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FreeingStrategy;
    use pdf_desktop_render::DocumentHandle;

    fn scale(value: f32) -> Scale {
        Scale::new(value).expect("positive scale")
    }

    fn page(doc: u64, index: u32) -> PageRef {
        PageRef::new(DocumentHandle::from_raw(doc), index)
    }

    fn key(page: PageRef, value: f32) -> CacheKey {
        CacheKey::new(page, scale(value))
    }

    fn buffer() -> PixelBuffer {
        PixelBuffer::new(4, 4)
    }

    fn scales(cache: &TextureCache, page: PageRef) -> Vec<f32> {
        cache.page_scales(page).into_iter().map(Scale::get).collect()
    }

    fn strict_cache(max: usize) -> Arc<TextureCache> {
        Arc::new(TextureCache::new(
            CacheConfig::default()
                .with_max_textures_keep(max)
                .with_freeing(FreeingStrategy::RefCounted),
        ))
    }

    #[test]
    fn test_entries_stay_sorted_descending() {
        let cache = TextureCache::default();
        let p = page(1, 0);

        for value in [0.5, 2.0, 1.0, 0.1, 1.5] {
            cache.put(key(p, value), buffer());
        }

        assert_eq!(scales(&cache, p), vec![2.0, 1.5, 1.0, 0.5, 0.1]);
    }

    #[test]
    fn test_capacity_evicts_highest_scale() {
        let cache = TextureCache::new(CacheConfig::default().with_max_textures_keep(2));
        let p = page(1, 0);

        cache.put(key(p, 2.0), buffer());
        cache.put(key(p, 1.0), buffer());
        let evicted = cache.put(key(p, 1.5), buffer());

        assert_eq!(evicted, Some(scale(2.0)));
        assert_eq!(scales(&cache, p), vec![1.5, 1.0]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_capacity_evicts_highest_even_when_inserting_higher() {
        let cache = TextureCache::new(CacheConfig::default().with_max_textures_keep(2));
        let p = page(1, 0);

        cache.put(key(p, 1.0), buffer());
        cache.put(key(p, 0.5), buffer());
        cache.put(key(p, 3.0), buffer());

        assert_eq!(scales(&cache, p), vec![3.0, 0.5]);
    }

    #[test]
    fn test_count_never_exceeds_capacity() {
        let cache = TextureCache::new(CacheConfig::default().with_max_textures_keep(3));
        let p = page(1, 0);

        for i in 1..=20 {
            cache.put(key(p, i as f32 * 0.1), buffer());
            let current = scales(&cache, p);
            assert!(current.len() <= 3);
            assert!(current.windows(2).all(|w| w[0] >= w[1]));
        }
        assert_eq!(cache.texture_count(), 3);
    }

    #[test]
    fn test_capacity_is_per_page() {
        let cache = TextureCache::new(CacheConfig::default().with_max_textures_keep(1));

        cache.put(key(page(1, 0), 1.0), buffer());
        cache.put(key(page(1, 1), 1.0), buffer());
        cache.put(key(page(2, 0), 1.0), buffer());

        assert_eq!(cache.texture_count(), 3);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_get_prefers_smallest_covering_scale() {
        let cache = TextureCache::default();
        let p = page(1, 0);
        for value in [2.0, 1.0, 0.5] {
            cache.put(key(p, value), buffer());
        }

        assert_eq!(cache.get(p, scale(0.7)).unwrap().scale(), scale(1.0));
        assert_eq!(cache.get(p, scale(1.0)).unwrap().scale(), scale(1.0));
        assert_eq!(cache.get(p, scale(0.1)).unwrap().scale(), scale(0.5));
        assert_eq!(cache.get(p, scale(1.2)).unwrap().scale(), scale(2.0));
    }

    #[test]
    fn test_get_falls_back_to_largest_scale() {
        let cache = TextureCache::default();
        let p = page(1, 0);
        cache.put(key(p, 0.5), buffer());
        cache.put(key(p, 1.0), buffer());

        let handle = cache.get(p, scale(2.5)).unwrap();
        assert_eq!(handle.scale(), scale(1.0));
        assert_eq!(handle.display_factor(2.5), 2.5);
    }

    #[test]
    fn test_get_miss_on_empty_page() {
        let cache = TextureCache::default();
        assert!(cache.get(page(1, 0), scale(1.0)).is_none());
        assert!(!cache.has_any(page(1, 0)));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_has_any_and_contains() {
        let cache = TextureCache::default();
        let p = page(1, 0);
        cache.put(key(p, 1.0), buffer());

        assert!(cache.has_any(p));
        assert!(!cache.has_any(page(1, 1)));
        assert!(cache.contains(key(p, 1.0)));
        assert!(!cache.contains(key(p, 0.5)));
    }

    #[test]
    fn test_is_fresh_tracks_mutations() {
        let cache = TextureCache::default();
        let p = page(1, 0);
        cache.put(key(p, 1.0), buffer());

        let handle = cache.get(p, scale(1.0)).unwrap();
        assert!(cache.is_fresh(handle.stamp()));

        // Lookups do not mutate.
        let _ = cache.get(p, scale(0.5));
        assert!(cache.is_fresh(handle.stamp()));

        cache.put(key(page(2, 0), 1.0), buffer());
        assert!(!cache.is_fresh(handle.stamp()));
        assert!(handle.produced_at() <= handle.stamp());
    }

    #[test]
    fn test_retain_mode_ignores_release() {
        let cache = TextureCache::default();
        let p = page(1, 0);
        cache.put(key(p, 1.0), buffer());

        let handle = cache.get(p, scale(1.0)).unwrap();
        assert_eq!(cache.ref_count(handle.key()), Some(0));
        assert_eq!(cache.release(handle.key()), Ok(()));
        assert_eq!(cache.release(key(p, 9.0)), Ok(()));
        assert!(cache.contains(key(p, 1.0)));
    }

    #[test]
    fn test_ref_counted_get_and_release() {
        let cache = strict_cache(5);
        let p = page(1, 0);
        cache.put(key(p, 1.0), buffer());
        assert_eq!(cache.ref_count(key(p, 1.0)), Some(0));

        let first = cache.get(p, scale(1.0)).unwrap();
        let second = cache.get(p, scale(1.0)).unwrap();
        assert!(first.same_entry(&second));
        assert_eq!(cache.ref_count(key(p, 1.0)), Some(2));

        cache.release(key(p, 1.0)).unwrap();
        assert_eq!(cache.ref_count(key(p, 1.0)), Some(1));
        assert!(cache.has_any(p));

        let epoch = cache.epoch();
        cache.release_handle(second).unwrap();
        assert!(!cache.has_any(p));
        assert!(cache.epoch() > epoch);
        assert_eq!(cache.stats().freed, 1);
        assert_eq!(cache.texture_count(), 0);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let cache = strict_cache(5);
        let p = page(1, 0);
        cache.put(key(p, 1.0), buffer());
        cache.put(key(p, 0.5), buffer());

        {
            let lease = cache.acquire(p, scale(0.5)).unwrap();
            assert_eq!(lease.scale(), scale(0.5));
            assert_eq!(cache.ref_count(key(p, 0.5)), Some(1));
        }

        assert!(!cache.contains(key(p, 0.5)));
        assert!(cache.contains(key(p, 1.0)));
    }

    #[test]
    fn test_lease_outlives_eviction() {
        let cache = strict_cache(1);
        let p = page(1, 0);
        cache.put(key(p, 1.0), buffer());

        let lease = cache.acquire(p, scale(1.0)).unwrap();
        cache.put(key(p, 0.5), buffer());
        assert!(!cache.contains(key(p, 1.0)));

        // Pixels survive through the lease; releasing is a no-op.
        assert_eq!(lease.buffer().width(), 4);
        assert_eq!(lease.release(), Ok(()));
        assert_eq!(scales(&cache, p), vec![0.5]);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "released more times"))]
    fn test_release_underflow_is_a_contract_violation() {
        let cache = strict_cache(5);
        let p = page(1, 0);
        cache.put(key(p, 1.0), buffer());

        assert_eq!(cache.release(key(p, 1.0)), Err(CacheError::ReleaseUnderflow(key(p, 1.0))));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "not cached"))]
    fn test_release_untracked_is_a_contract_violation() {
        let cache = strict_cache(5);
        let p = page(1, 0);

        assert_eq!(cache.release(key(p, 1.0)), Err(CacheError::UntrackedRelease(key(p, 1.0))));
    }

    #[test]
    fn test_buffers_are_shared_not_copied() {
        let cache = TextureCache::default();
        let p = page(1, 0);
        cache.put(key(p, 1.0), PixelBuffer::new(16, 8));

        let a = cache.get(p, scale(1.0)).unwrap();
        let b = cache.get(p, scale(1.0)).unwrap();
        assert!(Arc::ptr_eq(a.buffer(), b.buffer()));
        assert_eq!((a.buffer().width(), a.buffer().height()), (16, 8));
    }

    #[test]
    fn test_concurrent_put_and_get() {
        let cache = Arc::new(TextureCache::new(CacheConfig::default().with_max_textures_keep(3)));
        let p = page(1, 0);

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 1..=200 {
                    cache.put(key(p, (i % 17 + 1) as f32 * 0.25), buffer());
                }
            })
        };

        for _ in 0..200 {
            let current = scales(&cache, p);
            assert!(current.len() <= 3);
            assert!(current.windows(2).all(|w| w[0] >= w[1]));
            let _ = cache.get(p, scale(1.0));
        }

        writer.join().unwrap();
        assert_eq!(cache.texture_count(), 3);
    }
}
