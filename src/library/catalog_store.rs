//! Track catalog cache with coalesced background loading.
//!
//! The store starts `NotInitialized`. The first `load_async` flips it to
//! `Initializing` and pulls the source on a loader thread; every caller that
//! arrives while that load is in flight is parked as a waiter and notified
//! with the same result. A failed load reverts to `NotInitialized` so a later
//! request can retry. The id map and genre index are built off to the side and
//! published with a single pointer swap, so readers see either the empty
//! index or the complete one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread;

use log::{debug, error, info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::CatalogError;
use crate::library::catalog_source::CatalogSource;
use crate::library::track::{Artwork, BrowseItem, BrowseItemKind, SearchField, TrackRef};
use crate::media_id::{self, MEDIA_ID_EMPTY_ROOT, MEDIA_ID_MUSICS_BY_GENRE, MEDIA_ID_ROOT};

/// Load lifecycle of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    NotInitialized,
    Initializing,
    Initialized,
}

/// Completion callback for `load_async`; receives `true` on success.
pub type CatalogCallback = Box<dyn FnOnce(bool) + Send + 'static>;

#[derive(Debug, Clone, Default)]
struct CatalogIndex {
    tracks_by_id: HashMap<String, TrackRef>,
    /// Track ids per genre, in load order.
    track_ids_by_genre: BTreeMap<String, Vec<String>>,
    load_order: Vec<String>,
}

impl CatalogIndex {
    fn resolve(&self, ids: &[String]) -> Vec<TrackRef> {
        ids.iter()
            .filter_map(|id| self.tracks_by_id.get(id).cloned())
            .collect()
    }
}

struct LoaderState {
    state: CatalogState,
    waiters: Vec<CatalogCallback>,
    loads_started: u64,
}

/// Thread-safe catalog of known tracks.
pub struct CatalogStore {
    source: Box<dyn CatalogSource>,
    loader: Mutex<LoaderState>,
    index: RwLock<Arc<CatalogIndex>>,
    favorites: RwLock<HashSet<String>>,
    rng: Mutex<StdRng>,
}

fn seeded_rng() -> StdRng {
    let mut seed = [0u8; 32];
    if let Err(err) = getrandom::fill(&mut seed) {
        warn!("CatalogStore: falling back to time-based shuffle seed: {}", err);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        seed[..16].copy_from_slice(&nanos.to_le_bytes());
    }
    StdRng::from_seed(seed)
}

impl CatalogStore {
    pub fn new(source: Box<dyn CatalogSource>) -> Self {
        Self {
            source,
            loader: Mutex::new(LoaderState {
                state: CatalogState::NotInitialized,
                waiters: Vec::new(),
                loads_started: 0,
            }),
            index: RwLock::new(Arc::new(CatalogIndex::default())),
            favorites: RwLock::new(HashSet::new()),
            rng: Mutex::new(seeded_rng()),
        }
    }

    fn lock_loader(&self) -> std::sync::MutexGuard<'_, LoaderState> {
        match self.loader.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn snapshot(&self) -> Arc<CatalogIndex> {
        match self.index.read() {
            Ok(index) => Arc::clone(&index),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Returns the index only when the catalog is fully loaded.
    fn initialized_snapshot(&self) -> Option<Arc<CatalogIndex>> {
        if self.state() != CatalogState::Initialized {
            return None;
        }
        Some(self.snapshot())
    }

    pub fn state(&self) -> CatalogState {
        self.lock_loader().state
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == CatalogState::Initialized
    }

    /// Number of loads that actually pulled the source.
    pub fn loads_started(&self) -> u64 {
        self.lock_loader().loads_started
    }

    /// Loads the catalog in the background and reports the outcome.
    ///
    /// Already initialized: `callback(true)` runs immediately on the caller's
    /// thread. A load in flight: the callback joins it. Otherwise a new load
    /// starts on a loader thread.
    pub fn load_async<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let mut loader = self.lock_loader();
        match loader.state {
            CatalogState::Initialized => {
                drop(loader);
                callback(true);
                return;
            }
            CatalogState::Initializing => {
                debug!("CatalogStore: joining in-flight load");
                loader.waiters.push(Box::new(callback));
                return;
            }
            CatalogState::NotInitialized => {
                loader.state = CatalogState::Initializing;
                loader.loads_started += 1;
                loader.waiters.push(Box::new(callback));
            }
        }
        drop(loader);

        let store = Arc::clone(self);
        let spawn_result = thread::Builder::new()
            .name("catalog-loader".to_string())
            .spawn(move || {
                let result = store.retrieve();
                store.finish_load(result);
            });
        if let Err(err) = spawn_result {
            error!("CatalogStore: failed to spawn loader thread: {}", err);
            self.finish_load(Err(CatalogError::Source(err.to_string())));
        }
    }

    /// Blocks until the catalog is loaded (or the load fails).
    pub fn load_and_wait(self: &Arc<Self>) -> bool {
        let (tx, rx) = mpsc::channel();
        self.load_async(move |success| {
            let _ = tx.send(success);
        });
        rx.recv().unwrap_or(false)
    }

    fn retrieve(&self) -> Result<CatalogIndex, CatalogError> {
        let records = self.source.tracks()?;
        let mut index = CatalogIndex::default();
        for record in records {
            let track = record?;
            let id = track.id.clone();
            if index
                .tracks_by_id
                .insert(id.clone(), Arc::new(track))
                .is_some()
            {
                warn!("CatalogStore: duplicate track id {}, keeping latest", id);
            } else {
                index.load_order.push(id);
            }
        }
        for id in &index.load_order {
            if let Some(track) = index.tracks_by_id.get(id) {
                index
                    .track_ids_by_genre
                    .entry(track.genre.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        Ok(index)
    }

    fn finish_load(&self, result: Result<CatalogIndex, CatalogError>) {
        let success = result.is_ok();
        match result {
            Ok(index) => {
                info!(
                    "CatalogStore: loaded {} track(s) in {} genre(s)",
                    index.load_order.len(),
                    index.track_ids_by_genre.len()
                );
                let next = Arc::new(index);
                match self.index.write() {
                    Ok(mut current) => *current = next,
                    Err(poisoned) => *poisoned.into_inner() = next,
                }
            }
            Err(err) => warn!("CatalogStore: load failed, will allow retry: {}", err),
        }

        let waiters = {
            let mut loader = self.lock_loader();
            loader.state = if success {
                CatalogState::Initialized
            } else {
                CatalogState::NotInitialized
            };
            std::mem::take(&mut loader.waiters)
        };
        for waiter in waiters {
            waiter(success);
        }
    }

    pub fn get_track(&self, id: &str) -> Option<TrackRef> {
        self.snapshot().tracks_by_id.get(id).cloned()
    }

    pub fn genres_view(&self) -> Vec<String> {
        match self.initialized_snapshot() {
            Some(index) => index.track_ids_by_genre.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn tracks_by_genre(&self, genre: &str) -> Vec<TrackRef> {
        let Some(index) = self.initialized_snapshot() else {
            return Vec::new();
        };
        match index.track_ids_by_genre.get(genre) {
            Some(ids) => index.resolve(ids),
            None => Vec::new(),
        }
    }

    /// All tracks in a fresh random order.
    pub fn shuffled_view(&self) -> Vec<TrackRef> {
        let Some(index) = self.initialized_snapshot() else {
            return Vec::new();
        };
        let mut tracks = index.resolve(&index.load_order);
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracks.shuffle(&mut *rng);
        tracks
    }

    /// Case-insensitive substring search over one metadata field.
    pub fn search(&self, field: SearchField, query: &str) -> Vec<TrackRef> {
        let Some(index) = self.initialized_snapshot() else {
            return Vec::new();
        };
        let needle = query.to_lowercase();
        index
            .resolve(&index.load_order)
            .into_iter()
            .filter(|track| field.value(track).to_lowercase().contains(&needle))
            .collect()
    }

    /// Children of a browse node: root, the genre list, or one genre's tracks.
    pub fn children(&self, parent_media_id: &str) -> Vec<BrowseItem> {
        if !media_id::is_browseable(parent_media_id) || parent_media_id == MEDIA_ID_EMPTY_ROOT {
            return Vec::new();
        }
        if parent_media_id == MEDIA_ID_ROOT {
            return vec![BrowseItem {
                media_id: MEDIA_ID_MUSICS_BY_GENRE.to_string(),
                title: "Genres".to_string(),
                subtitle: Some("Songs by genre".to_string()),
                kind: BrowseItemKind::Browsable,
            }];
        }
        if parent_media_id == MEDIA_ID_MUSICS_BY_GENRE {
            return self
                .genres_view()
                .into_iter()
                .filter_map(|genre| {
                    let media_id =
                        media_id::create_media_id(None, &[MEDIA_ID_MUSICS_BY_GENRE, &genre])
                            .ok()?;
                    Some(BrowseItem {
                        media_id,
                        subtitle: Some(format!("{} songs", genre)),
                        title: genre,
                        kind: BrowseItemKind::Browsable,
                    })
                })
                .collect();
        }
        let hierarchy = media_id::hierarchy(parent_media_id);
        if hierarchy.len() == 2 && hierarchy[0] == MEDIA_ID_MUSICS_BY_GENRE {
            let genre = hierarchy[1];
            return self
                .tracks_by_genre(genre)
                .into_iter()
                .filter_map(|track| {
                    let media_id = media_id::create_media_id(
                        Some(&track.id),
                        &[MEDIA_ID_MUSICS_BY_GENRE, genre],
                    )
                    .ok()?;
                    Some(BrowseItem {
                        media_id,
                        title: track.title.clone(),
                        subtitle: Some(track.artist.clone()),
                        kind: BrowseItemKind::Playable,
                    })
                })
                .collect();
        }
        warn!("CatalogStore: skipping unmatched media id {}", parent_media_id);
        Vec::new()
    }

    /// Replaces the artwork of a track. Returns the updated track.
    pub fn update_artwork(&self, id: &str, artwork: Artwork) -> Option<TrackRef> {
        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let index = Arc::make_mut(&mut *guard);
        let Some(current) = index.tracks_by_id.get(id) else {
            error!("CatalogStore: artwork update for unknown track {}", id);
            debug_assert!(false, "artwork update for unknown track {}", id);
            return None;
        };
        let updated = Arc::new(current.with_artwork(artwork));
        index.tracks_by_id.insert(id.to_string(), Arc::clone(&updated));
        Some(updated)
    }

    /// Adds or removes a track from the favorite set.
    pub fn set_favorite(&self, id: &str, favorite: bool) -> bool {
        if self.is_initialized() && self.get_track(id).is_none() {
            error!("CatalogStore: favorite change for unknown track {}", id);
            return false;
        }
        let mut favorites = match self.favorites.write() {
            Ok(favorites) => favorites,
            Err(poisoned) => poisoned.into_inner(),
        };
        if favorite {
            favorites.insert(id.to_string());
        } else {
            favorites.remove(id);
        }
        true
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        match self.favorites.read() {
            Ok(favorites) => favorites.contains(id),
            Err(poisoned) => poisoned.into_inner().contains(id),
        }
    }

    pub fn favorites(&self) -> Vec<String> {
        let mut favorites: Vec<String> = match self.favorites.read() {
            Ok(favorites) => favorites.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        };
        favorites.sort();
        favorites
    }
}
