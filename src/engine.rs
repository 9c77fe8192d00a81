//! Wires capture to parsing to asset merging: one blocking pump thread
//! feeds a bounded frame channel, a fixed pool of workers parses and
//! merges, and the manager's background loops run alongside until the
//! stop signal fires or the stream ends.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pcap::{Activated, Capture};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info};

use crate::alerting::AlertDispatcher;
use crate::config::Config;
use crate::domain::manager::AssetManager;
use crate::network::capture::{self, CaptureError, RawFrame};
use crate::network::filter::build_bpf_filter;
use crate::network::parser::PacketParser;
use crate::storage::{self, StorageError};

/// Frames buffered between the capture pump and the workers. When full
/// the pump blocks and the OS capture buffer absorbs the burst.
const FRAME_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine { config }
    }

    pub async fn run_live(&self) -> Result<(), EngineError> {
        let mut cap = capture::open_live(&self.config.capture)?;
        let filter = build_bpf_filter(&self.config.parser.enabled_protocols);
        capture::apply_filter(&mut cap, filter.as_deref());
        self.run(cap, true).await
    }

    pub async fn run_offline(&self, path: &Path) -> Result<(), EngineError> {
        let mut cap = capture::open_offline(path)?;
        let filter = build_bpf_filter(&self.config.parser.enabled_protocols);
        capture::apply_filter(&mut cap, filter.as_deref());
        self.run(cap, false).await
    }

    async fn run<T>(&self, mut cap: Capture<T>, live: bool) -> Result<(), EngineError>
    where
        T: Activated + Send + 'static,
    {
        let storage = storage::build(&self.config.storage).await?;
        let alerts = AlertDispatcher::from_config(&self.config.alerting).map(Arc::new);
        let (manager, save_rx) =
            AssetManager::new(&self.config.parser, Arc::clone(&storage), alerts);
        manager.load_existing().await;

        let (shutdown_tx, _) = broadcast::channel(8);
        let background = manager.spawn_background(save_rx, &shutdown_tx);

        let stop = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::channel::<RawFrame>(FRAME_CHANNEL_CAPACITY);
        let frame_rx = Arc::new(Mutex::new(frame_rx));

        let pump_stop = Arc::clone(&stop);
        let pump =
            tokio::task::spawn_blocking(move || capture::pump(&mut cap, frame_tx, pump_stop));

        let parser = Arc::new(PacketParser::new(&self.config.parser.enabled_protocols));
        let workers = self.config.worker_count();
        info!("starting {workers} parser workers");

        let mut worker_handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            worker_handles.push(tokio::spawn(worker(
                idx,
                Arc::clone(&frame_rx),
                Arc::clone(&parser),
                Arc::clone(&manager),
                self.config.parser.max_packets,
                shutdown_tx.subscribe(),
            )));
        }
        // Workers hold the only receiver handles from here on, so the
        // channel closes (and the pump unblocks) once they all exit.
        drop(frame_rx);

        if live {
            let stop = Arc::clone(&stop);
            let shutdown_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("stop signal received, shutting down");
                    stop.store(true, Ordering::Relaxed);
                    let _ = shutdown_tx.send(());
                }
            });
        }

        for handle in worker_handles {
            if let Err(e) = handle.await {
                error!("parser worker failed: {e}");
            }
        }

        // End of stream, stop signal, or packet cap: wind everything down.
        stop.store(true, Ordering::Relaxed);
        let _ = shutdown_tx.send(());

        match pump.await {
            Ok(frames) => debug!("capture pump delivered {frames} frames"),
            Err(e) => error!("capture pump failed: {e}"),
        }
        for handle in background {
            if let Err(e) = handle.await {
                error!("background task failed: {e}");
            }
        }

        manager.refresh_stats(chrono::Utc::now());
        let stats = manager.stats();
        info!(
            "discovery finished: {} assets ({} active, {} new this run)",
            stats.total_assets, stats.active_assets, stats.new_assets
        );

        manager.flush().await;
        storage.close().await?;
        Ok(())
    }
}

/// One parser worker: pull a frame, parse it, merge the observation.
/// Exits on channel close, on the shutdown broadcast, or when the
/// optional per-worker packet cap is reached.
async fn worker(
    idx: usize,
    frames: Arc<Mutex<mpsc::Receiver<RawFrame>>>,
    parser: Arc<PacketParser>,
    manager: Arc<AssetManager>,
    max_packets: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut processed: u64 = 0;

    loop {
        let frame = {
            let mut rx = frames.lock().await;
            tokio::select! {
                frame = rx.recv() => frame,
                _ = shutdown.recv() => None,
            }
        };
        let Some(frame) = frame else { break };

        if let Some(obs) = parser.parse(&frame.data, frame.timestamp) {
            manager.merge(obs);
        }

        processed += 1;
        if max_packets > 0 && processed >= max_packets {
            debug!("worker {idx} reached the packet cap of {max_packets}");
            break;
        }
    }

    debug!("worker {idx} exiting after {processed} frames");
}
