//! The asset manager owns the in-memory asset table: it merges
//! observations, journals changes, expires stale records, keeps the
//! aggregate statistics fresh, and fans persistence out to a single
//! background worker so the merge path never waits on storage I/O.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::alerting::AlertDispatcher;
use crate::config::ParserConfig;
use crate::domain::models::{Asset, AssetStats, DeviceType, Observation};
use crate::storage::Storage;

/// Pending-save ids the persistence worker can lag behind by; beyond
/// that saves are dropped and the next merge re-attempts them.
const SAVE_QUEUE_CAPACITY: usize = 256;

const EXPIRY_INTERVAL: StdDuration = StdDuration::from_secs(300);
const STATS_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Stable asset identifier: MAC wins over IPv4, and an observation with
/// neither gets a timestamped fallback label.
pub fn identity(obs: &Observation, now: DateTime<Utc>) -> String {
    if let Some(mac) = obs.mac_address.as_deref().filter(|m| !m.is_empty()) {
        return format!("mac_{mac}");
    }
    if let Some(ip) = obs.ip_address.as_deref().filter(|ip| !ip.is_empty()) {
        return format!("ip_{ip}");
    }
    format!("unknown_{}", now.format("%Y%m%d%H%M%S"))
}

pub struct AssetManager {
    assets: RwLock<HashMap<String, Asset>>,
    stats: RwLock<AssetStats>,
    new_assets: AtomicU64,
    asset_timeout: Duration,
    storage: Arc<dyn Storage>,
    alerts: Option<Arc<AlertDispatcher>>,
    save_tx: mpsc::Sender<String>,
}

impl AssetManager {
    /// Returns the manager plus the receiving end of the save queue,
    /// which [`AssetManager::spawn_background`] consumes.
    pub fn new(
        config: &ParserConfig,
        storage: Arc<dyn Storage>,
        alerts: Option<Arc<AlertDispatcher>>,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (save_tx, save_rx) = mpsc::channel(SAVE_QUEUE_CAPACITY);
        let manager = Arc::new(AssetManager {
            assets: RwLock::new(HashMap::new()),
            stats: RwLock::new(AssetStats::default()),
            new_assets: AtomicU64::new(0),
            asset_timeout: Duration::minutes(config.asset_timeout as i64),
            storage,
            alerts,
            save_tx,
        });
        (manager, save_rx)
    }

    /// Load previously persisted assets so restarts keep identities and
    /// change journals. Documents that no longer deserialize are
    /// skipped, not fatal.
    pub async fn load_existing(&self) {
        let docs = match self.storage.list_all().await {
            Ok(docs) => docs,
            Err(e) => {
                error!("failed to load existing assets: {e}");
                return;
            }
        };

        let mut loaded = 0usize;
        let mut assets = self.assets.write();
        for doc in docs {
            match serde_json::from_value::<Asset>(doc) {
                Ok(asset) => {
                    assets.insert(asset.id.clone(), asset);
                    loaded += 1;
                }
                Err(e) => debug!("skipping unreadable asset document: {e}"),
            }
        }

        if loaded > 0 {
            info!("loaded {loaded} existing assets from storage");
        }
    }

    /// Merge one observation into the table. New assets bump the
    /// new-since-start counter and trigger alert dispatch; every merge
    /// schedules a background save.
    pub fn merge(&self, obs: Observation) {
        if !obs.has_findings() {
            return;
        }

        let now = Utc::now();
        let id = identity(&obs, now);
        let mut new_snapshot = None;

        {
            let mut assets = self.assets.write();
            match assets.entry(id.clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().absorb(&obs, now);
                    debug!("updated asset {id}");
                }
                Entry::Vacant(entry) => {
                    let asset = Asset::from_observation(id.clone(), &obs, now);
                    self.new_assets.fetch_add(1, Ordering::Relaxed);
                    info!(
                        "discovered new asset {id} ({}, {})",
                        asset.ip_address, asset.device_type
                    );
                    new_snapshot = Some(asset.clone());
                    entry.insert(asset);
                }
            }
        }

        if let (Some(asset), Some(dispatcher)) = (new_snapshot, &self.alerts) {
            let dispatcher = Arc::clone(dispatcher);
            tokio::spawn(async move { dispatcher.dispatch(&asset).await });
        }

        self.schedule_save(&id);
    }

    fn schedule_save(&self, id: &str) {
        if let Err(e) = self.save_tx.try_send(id.to_string()) {
            // Dropping is safe: the asset stays authoritative in memory
            // and the next merge schedules another save.
            debug!("save queue unavailable for {id}: {e}");
        }
    }

    /// Flip every active asset not seen since `now - asset_timeout` to
    /// inactive. Expired assets are retained, never deleted.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.asset_timeout;
        let mut flipped = Vec::new();

        {
            let mut assets = self.assets.write();
            for (id, asset) in assets.iter_mut() {
                if asset.is_active && asset.last_seen < cutoff {
                    asset.mark_inactive(now);
                    flipped.push(id.clone());
                }
            }
        }

        for id in &flipped {
            self.schedule_save(id);
        }
        if !flipped.is_empty() {
            info!("marked {} assets inactive", flipped.len());
        }
        flipped.len()
    }

    /// Rebuild the aggregate statistics snapshot from the table.
    pub fn refresh_stats(&self, now: DateTime<Utc>) {
        let mut fresh = AssetStats {
            new_assets: self.new_assets.load(Ordering::Relaxed),
            last_update: Some(now),
            ..AssetStats::default()
        };

        {
            let assets = self.assets.read();
            fresh.total_assets = assets.len();
            for asset in assets.values() {
                if asset.is_active {
                    fresh.active_assets += 1;
                }
                *fresh
                    .device_types
                    .entry(asset.device_type.as_str().to_string())
                    .or_insert(0) += 1;
                if !asset.os_info.family.is_empty() {
                    *fresh
                        .os_distribution
                        .entry(asset.os_info.family.clone())
                        .or_insert(0) += 1;
                }
            }
        }

        *self.stats.write() = fresh;
    }

    pub fn get(&self, id: &str) -> Option<Asset> {
        self.assets.read().get(id).cloned()
    }

    pub fn list_all(&self) -> Vec<Asset> {
        self.assets.read().values().cloned().collect()
    }

    pub fn active_assets(&self) -> Vec<Asset> {
        self.assets
            .read()
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect()
    }

    pub fn assets_by_type(&self, device_type: DeviceType) -> Vec<Asset> {
        self.assets
            .read()
            .values()
            .filter(|a| a.device_type == device_type)
            .cloned()
            .collect()
    }

    pub fn assets_by_os(&self, family: &str) -> Vec<Asset> {
        self.assets
            .read()
            .values()
            .filter(|a| a.os_info.family == family)
            .cloned()
            .collect()
    }

    /// Exact-match search over the identifying attributes.
    pub fn search(&self, query: &str) -> Vec<Asset> {
        self.assets
            .read()
            .values()
            .filter(|a| {
                a.ip_address == query
                    || a.mac_address == query
                    || a.hostname == query
                    || a.device_type.as_str() == query
                    || a.os_info.family == query
            })
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> AssetStats {
        self.stats.read().clone()
    }

    /// Serialise the whole table (keyed by id) through the backend's
    /// export hook.
    pub fn export_json(&self) -> Result<Vec<u8>, crate::storage::StorageError> {
        let assets = self.assets.read();
        let map: HashMap<&String, &Asset> = assets.iter().collect();
        let value = serde_json::to_value(&map)?;
        self.storage.export_json(&value)
    }

    async fn persist(&self, id: &str) {
        let doc = {
            let assets = self.assets.read();
            match assets.get(id) {
                Some(asset) => serde_json::to_value(asset),
                None => return,
            }
        };

        let doc: Value = match doc {
            Ok(doc) => doc,
            Err(e) => {
                error!("failed to serialise asset {id}: {e}");
                return;
            }
        };

        if let Err(e) = self.storage.save(doc).await {
            error!("failed to persist asset {id}: {e}");
        }
    }

    /// Save every asset; used at shutdown after the loops have exited.
    pub async fn flush(&self) {
        let snapshot = self.list_all();
        let total = snapshot.len();
        let mut saved = 0usize;

        for asset in snapshot {
            match serde_json::to_value(&asset) {
                Ok(doc) => match self.storage.save(doc).await {
                    Ok(()) => saved += 1,
                    Err(e) => error!("failed to persist asset {}: {e}", asset.id),
                },
                Err(e) => error!("failed to serialise asset {}: {e}", asset.id),
            }
        }

        info!("flushed {saved}/{total} assets to storage");
    }

    /// Start the expiry loop, the statistics loop, and the persistence
    /// worker. All three exit on the shutdown broadcast.
    pub fn spawn_background(
        self: &Arc<Self>,
        mut save_rx: mpsc::Receiver<String>,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let manager = Arc::clone(self);
        let mut stop = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EXPIRY_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.expire_stale(Utc::now());
                    }
                    _ = stop.recv() => break,
                }
            }
        }));

        let manager = Arc::clone(self);
        let mut stop = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATS_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.refresh_stats(Utc::now());
                    }
                    _ = stop.recv() => break,
                }
            }
        }));

        let manager = Arc::clone(self);
        let mut stop = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_id = save_rx.recv() => match maybe_id {
                        Some(id) => manager.persist(&id).await,
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        }));

        handles
    }
}
