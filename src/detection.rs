//! Non-blocking onset detection with polling.

use crate::{Error, Result};
use reslice_analysis::Detection;
use std::thread::JoinHandle;

pub enum DetectionStatus {
    Running,
    Complete(Detection),
    Failed(Error),
}

/// Handle to a detection pass running on its own thread.
///
/// Poll with [`poll()`](Self::poll) each frame, or block with [`wait()`](Self::wait).
/// Marker edits on the session fail with `DetectionInProgress` until the pass
/// has finished and written its markers.
pub struct DetectionHandle {
    thread: Option<JoinHandle<Result<Detection>>>,
}

impl DetectionHandle {
    pub(crate) fn new(thread: JoinHandle<Result<Detection>>) -> Self {
        Self {
            thread: Some(thread),
        }
    }

    /// Check for completion (non-blocking). A finished result is handed out once.
    pub fn poll(&mut self) -> DetectionStatus {
        match self.thread.take() {
            Some(thread) if thread.is_finished() => match join(thread) {
                Ok(detection) => DetectionStatus::Complete(detection),
                Err(e) => DetectionStatus::Failed(e),
            },
            Some(thread) => {
                self.thread = Some(thread);
                DetectionStatus::Running
            }
            None => DetectionStatus::Failed(Error::DetectionConsumed),
        }
    }

    pub fn wait(mut self) -> Result<Detection> {
        match self.thread.take() {
            Some(thread) => join(thread),
            None => Err(Error::DetectionConsumed),
        }
    }

    pub fn is_done(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| t.is_finished())
            .unwrap_or(true)
    }
}

fn join(thread: JoinHandle<Result<Detection>>) -> Result<Detection> {
    thread.join().map_err(|_| Error::DetectionPanicked)?
}
