//! Upload result reporting.

use crate::error::UploadError;
use log::{trace, warn};

/// Receiver of upload progress and outcome.
///
/// For every accepted upload exactly one of [`UploadCallback::on_complete`]
/// or [`UploadCallback::on_error`] is called, once. Calls come from the
/// session worker thread.
pub trait UploadCallback: Send {
    /// Bytes not yet sent. Never increases; `0` is reported once, right
    /// before [`UploadCallback::on_complete`].
    fn on_progress(&mut self, remaining_bytes: usize) {
        let _ = remaining_bytes;
    }

    /// The target confirmed the image.
    fn on_complete(&mut self);

    /// The upload failed or was refused.
    fn on_error(&mut self, error: UploadError);
}

/// Upload notifications as values, for channel-based consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    /// See [`UploadCallback::on_progress`].
    Progress(usize),
    /// See [`UploadCallback::on_complete`].
    Complete,
    /// See [`UploadCallback::on_error`].
    Error(UploadError),
}

impl UploadEvent {
    /// Whether this event ends the upload.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }
}

impl UploadCallback for crossbeam_channel::Sender<UploadEvent> {
    fn on_progress(&mut self, remaining_bytes: usize) {
        let _ = self.send(UploadEvent::Progress(remaining_bytes));
    }

    fn on_complete(&mut self) {
        let _ = self.send(UploadEvent::Complete);
    }

    fn on_error(&mut self, error: UploadError) {
        let _ = self.send(UploadEvent::Error(error));
    }
}

/// Guards a callback so that at most one terminal notification is made.
pub(crate) struct Reporter {
    callback: Option<Box<dyn UploadCallback>>,
}

impl Reporter {
    pub(crate) fn new(callback: Box<dyn UploadCallback>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub(crate) fn progress(&mut self, remaining_bytes: usize) {
        if let Some(callback) = self.callback.as_mut() {
            callback.on_progress(remaining_bytes);
        }
    }

    pub(crate) fn complete(&mut self) {
        match self.callback.take() {
            Some(mut callback) => callback.on_complete(),
            None => trace!("Completion after terminal report dropped"),
        }
    }

    pub(crate) fn error(&mut self, error: UploadError) {
        match self.callback.take() {
            Some(mut callback) => callback.on_error(error),
            None => trace!("Error {error:?} after terminal report dropped"),
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Some(mut callback) = self.callback.take() {
            warn!("Upload ended without a verdict");
            callback.on_error(UploadError::TransmissionError);
        }
    }
}
