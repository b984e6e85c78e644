//! Console uploader: runs one [`UploadSession`] per accepted request on a
//! dedicated worker thread.
//!
//! The console listener only forwards notifications into the worker's
//! queue, so every state transition, timer expiry and chunk send of a
//! session is serialized on that one thread.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};

use crate::console::{Console, ConsoleListener};
use crate::error::{Error, Result, UploadError};
use crate::image::{FirmwareImage, FwUpgradeType};
use crate::upload::callback::Reporter;
use crate::upload::session::{Action, Event, UploadSession};
use crate::upload::{UploadCallback, UploadConfig};

/// Uploads firmware images over a shared [`Console`].
///
/// At most one upload runs per uploader at a time.
pub struct ConsoleUploader<C: Console + 'static> {
    console: Arc<C>,
    config: UploadConfig,
    active: Arc<AtomicBool>,
}

impl<C: Console + 'static> ConsoleUploader<C> {
    /// Create an uploader with the default configuration.
    pub fn new(console: Arc<C>) -> Self {
        Self::with_config(console, UploadConfig::default())
    }

    /// Create an uploader with a custom configuration.
    pub fn with_config(console: Arc<C>, config: UploadConfig) -> Self {
        Self {
            console,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Upload configuration.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Whether an upload is currently running.
    pub fn is_uploading(&self) -> bool {
        self.active
            .load(Ordering::Acquire)
    }

    /// Start uploading `image`.
    ///
    /// Returns [`Error::Busy`] without touching the console or the callback
    /// when another upload is running.
    pub fn try_start_upload<F>(&self, image: FirmwareImage, callback: F) -> Result<UploadHandle>
    where
        F: UploadCallback + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Upload rejected: session already active");
            return Err(Error::Busy);
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let listener: Arc<dyn ConsoleListener> = Arc::new(SessionListener { tx });
        let worker = Worker {
            console: self.console.clone(),
            session: UploadSession::new(image, self.config.clone()),
            listener,
            events: rx,
            reporter: Reporter::new(Box::new(callback)),
            active: self.active.clone(),
            attached: false,
            released: false,
            timeout_at: None,
            pace_at: None,
        };

        let spawned = thread::Builder::new()
            .name("upload-worker".into())
            .spawn(move || worker.run());
        match spawned {
            Ok(thread) => Ok(UploadHandle { thread }),
            Err(e) => {
                // Dropping the unspawned worker reports TransmissionError
                // to the callback.
                self.active
                    .store(false, Ordering::Release);
                Err(Error::Io(e))
            },
        }
    }

    /// Start uploading `image`; `false` if another upload is running.
    pub fn start_upload<F>(&self, image: FirmwareImage, callback: F) -> bool
    where
        F: UploadCallback + 'static,
    {
        match self.try_start_upload(image, callback) {
            Ok(_) => true,
            Err(Error::Busy) => false,
            Err(e) => {
                error!("Failed to start upload: {e}");
                false
            },
        }
    }

    /// Validate an upgrade request, read the image file and start the
    /// upload.
    ///
    /// Unsupported types and unreadable files are reported through
    /// `callback` and return `false`. A busy uploader returns `false`
    /// without calling `callback`.
    pub fn load_fw_file<F, P>(&self, kind: FwUpgradeType, path: P, mut callback: F) -> bool
    where
        F: UploadCallback + 'static,
        P: AsRef<Path>,
    {
        if kind != FwUpgradeType::ApplicationFirmware {
            warn!("Upgrade type {kind} is not handled over the console");
            callback.on_error(UploadError::UnsupportedOperation);
            return false;
        }
        if self.is_uploading() {
            debug!("Upload rejected: session already active");
            return false;
        }

        let path = path.as_ref();
        let image = match FirmwareImage::from_file(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Cannot read firmware {}: {e}", path.display());
                callback.on_error(UploadError::InvalidFirmwareFile);
                return false;
            },
        };
        self.start_upload(image, callback)
    }
}

/// Handle to a running upload's worker thread.
pub struct UploadHandle {
    thread: JoinHandle<()>,
}

impl UploadHandle {
    /// Whether the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.thread
            .is_finished()
    }

    /// Block until the worker exits. The terminal callback has been made
    /// by then.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread
            .join()
    }
}

/// Console listener that forwards notifications to the session worker.
struct SessionListener {
    tx: Sender<Event>,
}

impl ConsoleListener for SessionListener {
    fn on_text_received(&self, data: &[u8]) {
        let _ = self
            .tx
            .send(Event::Text(data.to_vec()));
    }

    fn on_send_outcome(&self, error: Option<&io::Error>) {
        let outcome = match error {
            None => Ok(()),
            Some(e) => Err(e.kind()),
        };
        let _ = self
            .tx
            .send(Event::SendOutcome(outcome));
    }

    fn on_closed(&self) {
        let _ = self
            .tx
            .send(Event::SendOutcome(Err(io::ErrorKind::NotConnected)));
    }
}

struct Worker<C: Console> {
    console: Arc<C>,
    session: UploadSession,
    listener: Arc<dyn ConsoleListener>,
    events: Receiver<Event>,
    reporter: Reporter,
    active: Arc<AtomicBool>,
    attached: bool,
    released: bool,
    timeout_at: Option<Instant>,
    pace_at: Option<Instant>,
}

impl<C: Console> Worker<C> {
    fn run(mut self) {
        let actions = self
            .session
            .start();
        self.apply(actions);

        while !self
            .session
            .state()
            .is_terminal()
        {
            let event = self.next_event();
            let actions = self
                .session
                .handle(event);
            self.apply(actions);
        }
        debug!("Upload worker finished in {:?}", self.session.state());
    }

    /// Wait for the next event. Queued notifications are handled before
    /// expired timers; the response timeout fires before a pace tick.
    fn next_event(&mut self) -> Event {
        loop {
            let deadline = self
                .timeout_at
                .into_iter()
                .chain(self.pace_at)
                .min();
            let received = match deadline {
                Some(deadline) => self
                    .events
                    .recv_deadline(deadline),
                None => self
                    .events
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => return event,
                Err(RecvTimeoutError::Disconnected) => {
                    return Event::SendOutcome(Err(io::ErrorKind::BrokenPipe));
                },
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    if self.timeout_at.is_some_and(|at| at <= now) {
                        self.timeout_at = None;
                        return Event::Timeout;
                    }
                    if self.pace_at.is_some_and(|at| at <= now) {
                        self.pace_at = None;
                        return Event::PaceTick;
                    }
                },
            }
        }
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Attach => {
                    self.console
                        .add_listener(self.listener.clone());
                    self.attached = true;
                },
                Action::Send(bytes) => {
                    if let Err(e) = self
                        .console
                        .send(&bytes)
                    {
                        warn!("Console refused {} bytes: {e}", bytes.len());
                        let follow = self
                            .session
                            .handle(Event::SendOutcome(Err(error_kind(&e))));
                        self.apply(follow);
                        return;
                    }
                },
                Action::ArmTimeout(after) => self.timeout_at = Some(Instant::now() + after),
                Action::CancelTimeout => self.timeout_at = None,
                Action::SchedulePace(after) => self.pace_at = Some(Instant::now() + after),
                Action::CancelPace => self.pace_at = None,
                Action::Progress(remaining) => self
                    .reporter
                    .progress(remaining),
                Action::Complete => self
                    .reporter
                    .complete(),
                Action::Fail(kind) => self
                    .reporter
                    .error(kind),
                Action::Detach => self.detach(),
            }
        }
    }

    // Releases the console at most once: a later session may already own
    // the active flag when this worker is dropped.
    fn detach(&mut self) {
        if self.released {
            return;
        }
        if self.attached {
            self.console
                .remove_listener(&self.listener);
            self.attached = false;
        }
        self.released = true;
        self.active
            .store(false, Ordering::Release);
    }
}

impl<C: Console> Drop for Worker<C> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn error_kind(error: &Error) -> io::ErrorKind {
    match error {
        Error::Io(e) => e.kind(),
        _ => io::ErrorKind::Other,
    }
}
