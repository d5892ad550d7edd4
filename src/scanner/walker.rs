//! Work-stealing directory walker feeding per-worker scan accumulators.
//!
//! Directories flow through a shared work channel; each worker folds the
//! files it sees into a private [`ScanAccumulator`] and ships the partial to
//! the coordinator when the queue drains. Merging is deterministic because
//! every ranking key totally orders entries (path tiebreak).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;

use crate::core::cancel::CancelToken;
use crate::scanner::{ScanAccumulator, ScanConfig, ScanResult};

/// Item in the internal work queue: (directory, depth, root device id).
type WorkItem = (PathBuf, usize, u64);

/// Walk `root` and fold everything into one `ScanResult`.
pub(crate) fn walk(root: &Path, config: &ScanConfig, cancel: &CancelToken) -> ScanResult {
    let mut coordinator = ScanAccumulator::new(config.top_n);

    let root_meta = match metadata_for(root, config.follow_symlinks) {
        Ok(meta) => meta,
        Err(_) => return coordinator.finish(),
    };

    // A plain-file root is a degenerate single-entry scan.
    if root_meta.is_file() {
        if !cancel.is_cancelled() && root_meta.len() >= config.min_size {
            coordinator.record_file(root, root_meta.len(), root_meta.modified().ok());
        }
        return coordinator.finish();
    }
    if !root_meta.is_dir() {
        return coordinator.finish();
    }

    let parallelism = effective_parallelism(config.parallelism);
    let (work_tx, work_rx) = channel::unbounded::<WorkItem>();
    let (partial_tx, partial_rx) = channel::unbounded::<ScanAccumulator>();
    let in_flight = Arc::new(AtomicUsize::new(0));

    in_flight.fetch_add(1, Ordering::SeqCst);
    let _ = work_tx.send((root.to_path_buf(), 0, device_id(&root_meta)));

    let workers: Vec<_> = (0..parallelism)
        .map(|_| {
            let work_rx = work_rx.clone();
            let work_tx = work_tx.clone();
            let partial_tx = partial_tx.clone();
            let in_flight = Arc::clone(&in_flight);
            let config = config.clone();
            let cancel = cancel.clone();

            thread::spawn(move || {
                let mut local = ScanAccumulator::new(config.top_n);
                loop {
                    match work_rx.recv_timeout(Duration::from_millis(20)) {
                        Ok((dir, depth, root_dev)) => {
                            process_directory(
                                &dir, depth, root_dev, &work_tx, &in_flight, &config, &cancel,
                                &mut local,
                            );
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        }
                        Err(channel::RecvTimeoutError::Timeout) => {
                            if in_flight.load(Ordering::SeqCst) == 0 {
                                break;
                            }
                        }
                        Err(channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = partial_tx.send(local);
            })
        })
        .collect();

    drop(work_tx);
    drop(partial_tx);

    for partial in partial_rx {
        coordinator.merge(partial);
    }
    for handle in workers {
        let _ = handle.join();
    }

    coordinator.finish()
}

/// Read one directory: account files, count subdirectories, enqueue them.
#[allow(clippy::too_many_arguments)]
fn process_directory(
    dir: &Path,
    depth: usize,
    root_dev: u64,
    work_tx: &channel::Sender<WorkItem>,
    in_flight: &AtomicUsize,
    config: &ScanConfig,
    cancel: &CancelToken,
    local: &mut ScanAccumulator,
) {
    if cancel.is_cancelled() {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return,
        Err(_) => {
            local.record_error();
            return;
        }
    };

    let max_depth = config.max_depth.unwrap_or(usize::MAX);

    for entry_result in entries {
        if cancel.is_cancelled() {
            return;
        }

        let Ok(entry) = entry_result else {
            local.record_error();
            continue;
        };
        let child = entry.path();

        if !config.include_hidden && is_hidden(&child) {
            continue;
        }

        let Ok(meta) = metadata_for(&child, config.follow_symlinks) else {
            local.record_error();
            continue;
        };

        if !config.follow_symlinks && meta.file_type().is_symlink() {
            continue;
        }

        if meta.is_dir() {
            local.record_dir();

            if depth + 1 > max_depth {
                continue;
            }
            if !config.cross_mounts && device_id(&meta) != root_dev {
                continue;
            }
            in_flight.fetch_add(1, Ordering::SeqCst);
            if work_tx.send((child, depth + 1, root_dev)).is_err() {
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        } else if meta.is_file() {
            let size = meta.len();
            if size < config.min_size {
                continue;
            }
            local.record_file(&child, size, meta.modified().ok());
        }
        // FIFOs, sockets, device nodes: neither counted nor sized.
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

fn effective_parallelism(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    thread::available_parallelism().map_or(4, |cores| cores.get())
}

fn metadata_for(path: &Path, follow_symlinks: bool) -> std::io::Result<fs::Metadata> {
    if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
}

/// Device id from metadata, for the cross-mount guard.
fn device_id(meta: &fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.dev()
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        0
    }
}
