//! Capture sources: a live interface in promiscuous mode or a capture
//! file replayed to EOF. Both feed raw frames into the pipeline's
//! bounded channel from a blocking pump thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pcap::{Activated, Active, Capture, Device, Offline};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open interface {iface}: {source}")]
    OpenInterface { iface: String, source: pcap::Error },
    #[error("failed to open capture file {path}: {source}")]
    OpenFile { path: PathBuf, source: pcap::Error },
    #[error("failed to list capture devices: {0}")]
    ListDevices(pcap::Error),
}

/// One frame as delivered by the capture source.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

pub fn open_live(config: &CaptureConfig) -> Result<Capture<Active>, CaptureError> {
    let open_err = |source| CaptureError::OpenInterface {
        iface: config.interface.clone(),
        source,
    };

    let cap = Capture::from_device(config.interface.as_str())
        .map_err(open_err)?
        .promisc(config.promiscuous)
        .snaplen(config.snap_len)
        .timeout(config.timeout.as_millis() as i32)
        .buffer_size(config.buffer_size)
        .open()
        .map_err(open_err)?;

    info!(
        "capturing on {} (snaplen {}, promiscuous {}, buffer {} bytes)",
        config.interface, config.snap_len, config.promiscuous, config.buffer_size
    );
    Ok(cap)
}

pub fn open_offline(path: &Path) -> Result<Capture<Offline>, CaptureError> {
    let cap = Capture::from_file(path).map_err(|source| CaptureError::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!("replaying capture file {}", path.display());
    Ok(cap)
}

/// Attach a BPF filter. Compilation failures are logged and the capture
/// continues unfiltered.
pub fn apply_filter<T: Activated + ?Sized>(cap: &mut Capture<T>, filter: Option<&str>) {
    match filter {
        Some(expr) => {
            if let Err(e) = cap.filter(expr, true) {
                warn!("failed to set BPF filter {expr:?}: {e}");
            } else {
                info!("BPF filter set: {expr}");
            }
        }
        None => debug!("no BPF filter configured, capturing everything"),
    }
}

/// Print the available capture devices with their addresses, plus a
/// usage hint. Used when `live` is started without an interface.
pub fn list_interfaces() -> Result<(), CaptureError> {
    let devices = Device::list().map_err(CaptureError::ListDevices)?;
    if devices.is_empty() {
        println!("no capture devices found");
        return Ok(());
    }

    println!("available capture devices:");
    for device in &devices {
        match &device.desc {
            Some(desc) => println!("  {} ({desc})", device.name),
            None => println!("  {}", device.name),
        }
        for address in &device.addresses {
            match address.netmask {
                Some(netmask) => println!("    {} / {netmask}", address.addr),
                None => println!("    {}", address.addr),
            }
        }
    }
    println!();
    println!("pick one with: spanwatch live -i {}", devices[0].name);

    Ok(())
}

/// Blocking pump: read frames until end-of-stream or the stop flag, and
/// push them into the bounded pipeline channel. When the channel is
/// full the pump blocks, which leans on the OS capture buffer for
/// burst absorption. Runs on a `spawn_blocking` thread.
pub fn pump<T: Activated + ?Sized>(
    cap: &mut Capture<T>,
    tx: mpsc::Sender<RawFrame>,
    stop: Arc<AtomicBool>,
) -> u64 {
    let mut frames: u64 = 0;

    loop {
        if stop.load(Ordering::Relaxed) {
            debug!("capture pump stopping on signal");
            break;
        }

        match cap.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                let timestamp =
                    DateTime::from_timestamp(ts.tv_sec as i64, (ts.tv_usec.max(0) as u32) * 1000)
                        .unwrap_or_else(Utc::now);
                let frame = RawFrame {
                    timestamp,
                    data: packet.data.to_vec(),
                };
                if tx.blocking_send(frame).is_err() {
                    debug!("frame channel closed, capture pump exiting");
                    break;
                }
                frames += 1;
            }
            // Read timeout: loop back so the stop flag is observed.
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => {
                info!("end of capture stream after {frames} frames");
                break;
            }
            Err(e) => {
                error!("capture error after {frames} frames: {e}");
                break;
            }
        }
    }

    if let Ok(stats) = cap.stats() {
        info!(
            "capture stats: {} received, {} dropped, {} dropped by interface",
            stats.received, stats.dropped, stats.if_dropped
        );
        if stats.dropped > 0 {
            warn!("{} frames were dropped by the capture buffer", stats.dropped);
        }
    }

    frames
}
