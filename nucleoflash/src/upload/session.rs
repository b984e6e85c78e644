//! Upload protocol state machine.
//!
//! [`UploadSession`] performs no I/O and owns no timers. It consumes
//! [`Event`]s and answers with [`Action`]s that a driver carries out
//! against the console and its clock. A `Send` action is always the last
//! one in a batch, so a driver whose send fails synchronously can stop
//! there and feed the failure back as [`Event::SendOutcome`].
//!
//! ```text
//! Idle --start--> AwaitingHandshakeAck --crc ok--> Transferring
//!                        |                             |
//!                   crc mismatch               all chunks confirmed
//!                   send error                         |
//!                   timeout                            v
//!                        |                  AwaitingCompletionAck
//!                        v                      |           |
//!                     Failed <---- other reply -+  [0x01] --+--> Succeeded
//! ```

use std::io;
use std::ops::Range;
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::error::UploadError;
use crate::image::FirmwareImage;
use crate::protocol::{COMPLETION_ACK, CRC_ACK_LEN, HandshakeCommand, decode_crc_ack};
use crate::upload::{TransferPacer, UploadConfig};

/// Protocol state of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not yet sent.
    Idle,
    /// Handshake sent, waiting for the target to echo the CRC.
    AwaitingHandshakeAck,
    /// Streaming data chunks.
    Transferring,
    /// Every chunk delivered, waiting for the target's verdict.
    AwaitingCompletionAck,
    /// The target accepted the image.
    Succeeded,
    /// The upload ended with an error.
    Failed(UploadError),
}

impl SessionState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Bytes printed by the target.
    Text(Vec<u8>),
    /// Outcome of the oldest unconfirmed send.
    SendOutcome(std::result::Result<(), io::ErrorKind>),
    /// The armed response timeout expired.
    Timeout,
    /// The scheduled chunk delay elapsed.
    PaceTick,
}

/// Work requested from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Attach the session listener to the console.
    Attach,
    /// Write bytes to the console.
    Send(Vec<u8>),
    /// Replace any armed timeout with a new one.
    ArmTimeout(Duration),
    /// Disarm the timeout.
    CancelTimeout,
    /// Deliver [`Event::PaceTick`] after the delay.
    SchedulePace(Duration),
    /// Drop any scheduled pace tick.
    CancelPace,
    /// Report the bytes not yet sent.
    Progress(usize),
    /// Report success.
    Complete,
    /// Report failure.
    Fail(UploadError),
    /// Detach the session listener from the console.
    Detach,
}

/// State of one firmware upload.
#[derive(Debug)]
pub struct UploadSession {
    image: FirmwareImage,
    config: UploadConfig,
    state: SessionState,
    pacer: TransferPacer,
    ack_buf: Vec<u8>,
    handshake_delivered: bool,
    chunks_confirmed: usize,
}

impl UploadSession {
    /// Create a session for `image`.
    ///
    /// A zero `chunk_size` or `progress_period` is raised to 1.
    pub fn new(image: FirmwareImage, mut config: UploadConfig) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        config.progress_period = config.progress_period.max(1);
        let pacer = TransferPacer::new(image.len(), config.chunk_size, config.chunk_interval);
        Self {
            image,
            config,
            state: SessionState::Idle,
            pacer,
            ack_buf: Vec::with_capacity(CRC_ACK_LEN),
            handshake_delivered: false,
            chunks_confirmed: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes handed to the console so far.
    pub fn bytes_sent(&self) -> usize {
        self.pacer
            .bytes_sent()
    }

    /// Chunks whose delivery the console confirmed.
    pub fn chunks_confirmed(&self) -> usize {
        self.chunks_confirmed
    }

    /// Begin the upload: attach, arm the handshake timeout, send the
    /// handshake frame.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state != SessionState::Idle {
            warn!("Upload session already started ({:?})", self.state);
            return Vec::new();
        }

        let frame = HandshakeCommand::new(self.image.wire_len(), self.image.crc()).build();
        info!(
            "Starting upload: {} bytes, CRC {:#010X}",
            self.image.len(),
            self.image.crc()
        );
        self.state = SessionState::AwaitingHandshakeAck;
        vec![
            Action::Attach,
            Action::ArmTimeout(self.config.handshake_timeout),
            Action::Send(frame),
        ]
    }

    /// Advance the state machine.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.state.is_terminal() {
            trace!("Ignoring {event:?} after {:?}", self.state);
            return Vec::new();
        }

        match event {
            Event::Text(data) => self.on_text(&data),
            Event::SendOutcome(Ok(())) => self.on_delivered(),
            Event::SendOutcome(Err(kind)) => {
                warn!("Console send failed: {kind}");
                self.fail(UploadError::TransmissionError)
            },
            Event::Timeout => {
                warn!("Target response timed out in {:?}", self.state);
                self.fail(UploadError::TransmissionError)
            },
            Event::PaceTick => self.on_pace_tick(),
        }
    }

    /// Bytes of the chunk in `range`.
    pub fn chunk(&self, range: Range<usize>) -> &[u8] {
        &self.image.data()[range]
    }

    fn on_text(&mut self, data: &[u8]) -> Vec<Action> {
        match self.state {
            SessionState::Idle => Vec::new(),
            SessionState::AwaitingHandshakeAck => self.on_handshake_ack(data),
            SessionState::Transferring if self.pacer.is_exhausted() => {
                debug!("Verdict arrived before every delivery was confirmed");
                self.on_verdict(data)
            },
            SessionState::Transferring => {
                warn!(
                    "Target replied with {} of {} bytes sent",
                    self.pacer.bytes_sent(),
                    self.image.len()
                );
                self.fail(UploadError::CorruptedFile)
            },
            SessionState::AwaitingCompletionAck => self.on_verdict(data),
            SessionState::Succeeded | SessionState::Failed(_) => Vec::new(),
        }
    }

    fn on_handshake_ack(&mut self, data: &[u8]) -> Vec<Action> {
        let missing = CRC_ACK_LEN - self.ack_buf.len();
        self.ack_buf
            .extend(data.iter().take(missing));
        if self.ack_buf.len() < CRC_ACK_LEN {
            trace!("Handshake ack: {} of {CRC_ACK_LEN} bytes", self.ack_buf.len());
            return Vec::new();
        }

        let echoed = decode_crc_ack(&self.ack_buf);
        if echoed != Some(self.image.crc()) {
            warn!(
                "Handshake CRC mismatch: expected {:#010X}, target echoed {:08X?}",
                self.image.crc(),
                echoed
            );
            return self.fail(UploadError::TransmissionError);
        }

        debug!("Target acknowledged handshake");
        self.state = SessionState::Transferring;
        if self.pacer.is_exhausted() {
            return self.await_completion();
        }
        vec![
            Action::ArmTimeout(self.config.response_timeout),
            Action::SchedulePace(self.pacer.interval()),
        ]
    }

    fn on_pace_tick(&mut self) -> Vec<Action> {
        if self.state != SessionState::Transferring {
            return Vec::new();
        }
        let Some(range) = self.pacer.next_chunk() else {
            return Vec::new();
        };

        trace!("Sending chunk {:?}", range);
        let mut actions = Vec::with_capacity(2);
        if !self.pacer.is_exhausted() {
            actions.push(Action::SchedulePace(self.pacer.interval()));
        }
        actions.push(Action::Send(self.chunk(range).to_vec()));
        actions
    }

    fn on_delivered(&mut self) -> Vec<Action> {
        if !self.handshake_delivered {
            self.handshake_delivered = true;
            return Vec::new();
        }
        if self.state != SessionState::Transferring
            || self.chunks_confirmed >= self.pacer.chunks_sent()
        {
            return Vec::new();
        }

        self.chunks_confirmed += 1;
        let mut actions = vec![Action::ArmTimeout(self.config.response_timeout)];
        let remaining = self.pacer.remaining();
        if self.chunks_confirmed % self.config.progress_period == 0 && remaining > 0 {
            actions.push(Action::Progress(remaining));
        }

        if self.pacer.is_exhausted() && self.chunks_confirmed == self.pacer.chunks_sent() {
            debug!("All {} chunks delivered", self.chunks_confirmed);
            actions.extend(self.await_completion());
        }
        actions
    }

    fn await_completion(&mut self) -> Vec<Action> {
        self.state = SessionState::AwaitingCompletionAck;
        vec![
            Action::CancelPace,
            Action::ArmTimeout(self.config.response_timeout),
        ]
    }

    fn on_verdict(&mut self, data: &[u8]) -> Vec<Action> {
        match data {
            [] => Vec::new(),
            [COMPLETION_ACK] => self.succeed(),
            other => {
                warn!("Target rejected image (reply {other:02X?})");
                self.fail(UploadError::CorruptedFile)
            },
        }
    }

    fn succeed(&mut self) -> Vec<Action> {
        info!("Upload complete");
        self.state = SessionState::Succeeded;
        vec![
            Action::CancelTimeout,
            Action::CancelPace,
            Action::Detach,
            Action::Progress(0),
            Action::Complete,
        ]
    }

    fn fail(&mut self, error: UploadError) -> Vec<Action> {
        self.state = SessionState::Failed(error);
        vec![
            Action::CancelTimeout,
            Action::CancelPace,
            Action::Detach,
            Action::Fail(error),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UploadConfig {
        UploadConfig::default()
    }

    fn session(data: &[u8]) -> UploadSession {
        let image = FirmwareImage::from_bytes(data.to_vec()).unwrap();
        UploadSession::new(image, config())
    }

    fn crc_ack(session: &UploadSession) -> Event {
        Event::Text(session.image.crc().to_le_bytes().to_vec())
    }

    /// Start, deliver the handshake and acknowledge it.
    fn transferring(data: &[u8]) -> UploadSession {
        let mut s = session(data);
        s.start();
        s.handle(Event::SendOutcome(Ok(())));
        let ack = crc_ack(&s);
        s.handle(ack);
        s
    }

    fn sends(actions: &[Action]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, Action::Send(_)))
            .count()
    }

    #[test]
    fn test_start_sends_handshake_last() {
        let mut s = session(&[0x78, 0x56, 0x34, 0x12]);
        let actions = s.start();

        assert_eq!(actions[0], Action::Attach);
        assert_eq!(actions[1], Action::ArmTimeout(config().handshake_timeout));
        let Some(Action::Send(frame)) = actions.last() else {
            panic!("handshake not sent last: {actions:?}");
        };
        assert_eq!(&frame[..9], b"upgradeFw");
        assert_eq!(&frame[9..13], &4u32.to_le_bytes());
        assert_eq!(&frame[13..17], &0xDF8A_8A2Bu32.to_le_bytes());
        assert_eq!(s.state(), SessionState::AwaitingHandshakeAck);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut s = session(&[1, 2, 3, 4]);
        s.start();
        assert!(s.start().is_empty());
    }

    #[test]
    fn test_crc_ack_enters_transferring() {
        let s = transferring(&[0u8; 40]);
        assert_eq!(s.state(), SessionState::Transferring);
    }

    #[test]
    fn test_crc_ack_split_across_notifications() {
        let mut s = session(&[0u8; 40]);
        s.start();
        let crc = s.image.crc().to_le_bytes();

        assert!(s.handle(Event::Text(crc[..1].to_vec())).is_empty());
        assert!(s.handle(Event::Text(crc[1..3].to_vec())).is_empty());
        let actions = s.handle(Event::Text(crc[3..].to_vec()));

        assert_eq!(s.state(), SessionState::Transferring);
        assert!(actions.contains(&Action::SchedulePace(config().chunk_interval)));
    }

    #[test]
    fn test_crc_mismatch_fails_without_chunks() {
        let mut s = session(&[0u8; 40]);
        s.start();
        let wrong = (s.image.crc() ^ 1).to_le_bytes().to_vec();
        let actions = s.handle(Event::Text(wrong));

        assert_eq!(s.state(), SessionState::Failed(UploadError::TransmissionError));
        assert!(actions.contains(&Action::Detach));
        assert_eq!(actions.last(), Some(&Action::Fail(UploadError::TransmissionError)));
        assert_eq!(sends(&actions), 0);
        assert!(s.handle(Event::PaceTick).is_empty());
        assert_eq!(s.bytes_sent(), 0);
    }

    #[test]
    fn test_handshake_timeout() {
        let mut s = session(&[0u8; 8]);
        s.start();
        let actions = s.handle(Event::Timeout);
        assert_eq!(
            actions,
            vec![
                Action::CancelTimeout,
                Action::CancelPace,
                Action::Detach,
                Action::Fail(UploadError::TransmissionError),
            ]
        );
    }

    #[test]
    fn test_handshake_send_error() {
        let mut s = session(&[0u8; 8]);
        s.start();
        let actions = s.handle(Event::SendOutcome(Err(io::ErrorKind::BrokenPipe)));
        assert_eq!(actions.last(), Some(&Action::Fail(UploadError::TransmissionError)));
    }

    #[test]
    fn test_pacing_25_bytes() {
        let mut s = transferring(&[0xAA; 25]);

        let first = s.handle(Event::PaceTick);
        assert_eq!(first[0], Action::SchedulePace(config().chunk_interval));
        assert_eq!(first[1], Action::Send(vec![0xAA; 16]));
        assert_eq!(s.bytes_sent(), 16);

        let second = s.handle(Event::PaceTick);
        assert_eq!(second, vec![Action::Send(vec![0xAA; 9])]);
        assert_eq!(s.bytes_sent(), 25);

        assert!(s.handle(Event::PaceTick).is_empty());
    }

    #[test]
    fn test_last_confirmation_awaits_completion() {
        let mut s = transferring(&[0u8; 20]);
        s.handle(Event::PaceTick);
        s.handle(Event::PaceTick);

        let actions = s.handle(Event::SendOutcome(Ok(())));
        assert_eq!(s.state(), SessionState::Transferring);
        assert_eq!(actions, vec![Action::ArmTimeout(config().response_timeout)]);

        let actions = s.handle(Event::SendOutcome(Ok(())));
        assert_eq!(s.state(), SessionState::AwaitingCompletionAck);
        assert!(actions.contains(&Action::CancelPace));
        assert_eq!(s.chunks_confirmed(), 2);
    }

    #[test]
    fn test_stray_confirmation_ignored() {
        let mut s = transferring(&[0u8; 20]);
        assert!(s.handle(Event::SendOutcome(Ok(()))).is_empty());
        assert_eq!(s.chunks_confirmed(), 0);
    }

    #[test]
    fn test_completion_ack_succeeds() {
        let mut s = transferring(&[0u8; 4]);
        s.handle(Event::PaceTick);
        s.handle(Event::SendOutcome(Ok(())));

        let actions = s.handle(Event::Text(vec![0x01]));
        assert_eq!(
            actions,
            vec![
                Action::CancelTimeout,
                Action::CancelPace,
                Action::Detach,
                Action::Progress(0),
                Action::Complete,
            ]
        );
        assert_eq!(s.state(), SessionState::Succeeded);
    }

    #[test]
    fn test_wrong_completion_byte_is_corruption() {
        let mut s = transferring(&[0u8; 4]);
        s.handle(Event::PaceTick);
        s.handle(Event::SendOutcome(Ok(())));

        let actions = s.handle(Event::Text(vec![0x02]));
        assert_eq!(actions.last(), Some(&Action::Fail(UploadError::CorruptedFile)));
    }

    #[test]
    fn test_ack_byte_with_trailing_bytes_is_corruption() {
        let mut s = transferring(&[0u8; 4]);
        s.handle(Event::PaceTick);
        s.handle(Event::SendOutcome(Ok(())));

        let actions = s.handle(Event::Text(vec![0x01, 0xFF]));
        assert_eq!(s.state(), SessionState::Failed(UploadError::CorruptedFile));
        assert!(!actions.contains(&Action::Complete));
        assert!(!actions.contains(&Action::Progress(0)));
    }

    #[test]
    fn test_ack_line_is_corruption() {
        let mut s = transferring(&[0u8; 4]);
        s.handle(Event::PaceTick);
        s.handle(Event::SendOutcome(Ok(())));

        s.handle(Event::Text(b"\x01\r\n".to_vec()));
        assert_eq!(s.state(), SessionState::Failed(UploadError::CorruptedFile));
    }

    #[test]
    fn test_zero_progress_period_is_clamped() {
        let image = FirmwareImage::from_bytes(vec![0u8; 32]).unwrap();
        let config = UploadConfig {
            progress_period: 0,
            ..UploadConfig::default()
        };
        let mut s = UploadSession::new(image, config);
        s.start();
        s.handle(Event::SendOutcome(Ok(())));
        let ack = crc_ack(&s);
        s.handle(ack);

        s.handle(Event::PaceTick);
        let actions = s.handle(Event::SendOutcome(Ok(())));
        assert!(actions.contains(&Action::Progress(16)));
        assert_eq!(s.chunks_confirmed(), 1);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let image = FirmwareImage::from_bytes(vec![0xAB; 3]).unwrap();
        let config = UploadConfig {
            chunk_size: 0,
            ..UploadConfig::default()
        };
        let mut s = UploadSession::new(image, config);
        s.start();
        s.handle(Event::SendOutcome(Ok(())));
        let ack = crc_ack(&s);
        s.handle(ack);

        let actions = s.handle(Event::PaceTick);
        assert_eq!(actions.last(), Some(&Action::Send(vec![0xAB])));
        assert_eq!(s.bytes_sent(), 1);
    }

    #[test]
    fn test_empty_verdict_ignored() {
        let mut s = transferring(&[0u8; 4]);
        s.handle(Event::PaceTick);
        s.handle(Event::SendOutcome(Ok(())));
        assert!(s.handle(Event::Text(Vec::new())).is_empty());
        assert_eq!(s.state(), SessionState::AwaitingCompletionAck);
    }

    #[test]
    fn test_completion_timeout_is_transmission_error() {
        let mut s = transferring(&[0u8; 4]);
        s.handle(Event::PaceTick);
        s.handle(Event::SendOutcome(Ok(())));

        let actions = s.handle(Event::Timeout);
        assert_eq!(actions.last(), Some(&Action::Fail(UploadError::TransmissionError)));
        assert!(!actions.contains(&Action::Complete));
    }

    #[test]
    fn test_verdict_before_last_confirmation() {
        let mut s = transferring(&[0u8; 4]);
        s.handle(Event::PaceTick);
        let actions = s.handle(Event::Text(vec![0x01]));
        assert!(actions.contains(&Action::Complete));
    }

    #[test]
    fn test_reply_mid_transfer_is_corruption() {
        let mut s = transferring(&[0u8; 64]);
        s.handle(Event::PaceTick);
        let actions = s.handle(Event::Text(vec![0x01]));
        assert_eq!(actions.last(), Some(&Action::Fail(UploadError::CorruptedFile)));
    }

    #[test]
    fn test_progress_every_tenth_confirmation() {
        let mut s = transferring(&[0u8; 16 * 25]);
        let mut reported = Vec::new();
        for _ in 0..25 {
            s.handle(Event::PaceTick);
            for action in s.handle(Event::SendOutcome(Ok(()))) {
                if let Action::Progress(remaining) = action {
                    reported.push(remaining);
                }
            }
        }
        assert_eq!(reported, vec![16 * 15, 16 * 5]);
        assert_eq!(s.state(), SessionState::AwaitingCompletionAck);
    }

    #[test]
    fn test_zero_remaining_reported_once() {
        let mut s = transferring(&[0u8; 16 * 10]);
        let mut zeros = 0;
        for _ in 0..10 {
            s.handle(Event::PaceTick);
            zeros += s
                .handle(Event::SendOutcome(Ok(())))
                .iter()
                .filter(|a| **a == Action::Progress(0))
                .count();
        }
        zeros += s
            .handle(Event::Text(vec![0x01]))
            .iter()
            .filter(|a| **a == Action::Progress(0))
            .count();
        assert_eq!(zeros, 1);
    }

    #[test]
    fn test_chunk_send_error() {
        let mut s = transferring(&[0u8; 64]);
        s.handle(Event::PaceTick);
        let actions = s.handle(Event::SendOutcome(Err(io::ErrorKind::TimedOut)));
        assert_eq!(actions.last(), Some(&Action::Fail(UploadError::TransmissionError)));
        assert!(s.handle(Event::PaceTick).is_empty());
    }

    #[test]
    fn test_empty_image_skips_transfer() {
        let mut s = session(&[]);
        s.start();
        let ack = crc_ack(&s);
        s.handle(ack);
        assert_eq!(s.state(), SessionState::AwaitingCompletionAck);
        let actions = s.handle(Event::Text(vec![0x01]));
        assert!(actions.contains(&Action::Complete));
    }

    #[test]
    fn test_events_after_terminal_ignored() {
        let mut s = session(&[0u8; 8]);
        s.start();
        s.handle(Event::Timeout);
        assert!(s.handle(Event::Timeout).is_empty());
        assert!(s.handle(Event::Text(vec![0x01])).is_empty());
        assert!(s.handle(Event::SendOutcome(Ok(()))).is_empty());
    }
}
