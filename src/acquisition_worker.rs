//! The background thread that keeps the frame synchronizer running and
//! publishes the newest frame into a shared, lock-protected cell.
//!
//! There is exactly one writer (the worker) and any number of readers. The
//! cell only ever holds the latest frame: nothing is queued, and a reader
//! that polls faster than frames arrive will simply see the same frame
//! again (with the same sequence number).

use crate::byte_source::ByteSource;
use crate::frame_codec::ForceTorqueFrame;
use crate::frame_synchronizer::{FrameSynchronizer, SyncStats};
use log::{debug, error, info, warn};
use std::io;
use std::sync::{
    mpsc::{self, TryRecvError},
    Arc, PoisonError, RwLock,
};
use std::thread;

/// What the worker has published so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedReading {
    /// The last frame that passed its checksum, if any has yet
    pub frame: Option<ForceTorqueFrame>,
    /// How many frames have been published; grows by one per frame
    pub sequence: u64,
    /// Set if the worker died on a hard I/O error
    pub fault: Option<String>,
}

/// A read-only handle on the worker's output. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReadingHandle {
    cell: Arc<RwLock<SharedReading>>,
}

impl ReadingHandle {
    /// A copy of the current contents of the cell
    pub fn latest(&self) -> SharedReading {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

enum Signal {
    Stop,
}

/// Owns the acquisition thread. Dropping it stops and joins the thread.
pub struct AcquisitionWorker {
    handle: Option<thread::JoinHandle<SyncStats>>,
    tx: mpsc::Sender<Signal>,
    reader: ReadingHandle,
}

impl AcquisitionWorker {
    /// Moves `source` onto a new thread and starts decoding frames from it.
    pub fn spawn<S>(mut source: S, mut synchronizer: FrameSynchronizer) -> io::Result<Self>
    where
        S: ByteSource + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Signal>();
        let cell = Arc::new(RwLock::new(SharedReading::default()));
        let th_cell = Arc::clone(&cell);

        let handle = thread::Builder::new()
            .name("ft-acquisition".to_owned())
            .spawn(move || {
                loop {
                    match rx.try_recv() {
                        Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    match synchronizer.poll(&mut source) {
                        Ok(Some(frame)) => {
                            let mut shared = th_cell.write().unwrap_or_else(PoisonError::into_inner);
                            shared.frame = Some(frame);
                            shared.sequence += 1;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("force/torque acquisition failed: {e}");
                            th_cell
                                .write()
                                .unwrap_or_else(PoisonError::into_inner)
                                .fault = Some(e.to_string());
                            break;
                        }
                    }
                }

                let stats = synchronizer.stats();
                info!(
                    "acquisition stopped: {} frames, {} checksum failures, {} lock losses",
                    stats.frames, stats.checksum_failures, stats.lock_losses
                );
                stats
            })?;

        Ok(Self {
            handle: Some(handle),
            tx,
            reader: ReadingHandle { cell },
        })
    }

    /// A handle readers can poll from any thread
    pub fn reader(&self) -> ReadingHandle {
        self.reader.clone()
    }

    /// A copy of the current contents of the cell
    pub fn latest(&self) -> SharedReading {
        self.reader.latest()
    }

    /// True while the thread is running
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Asks the thread to finish its current read and exit, then joins it.
    /// Returns the synchronizer's counters, or `None` if already stopped.
    pub fn stop(&mut self) -> Option<SyncStats> {
        let handle = self.handle.take()?;
        // the thread may already be gone after a fault, which is fine
        let _ = self.tx.send(Signal::Stop);
        debug!("joining acquisition worker");
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("acquisition worker panicked");
                None
            }
        }
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
