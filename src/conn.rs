use std::time::Duration;

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::context::Context;
use crate::state::State;
use crate::Error;

/// What a [`Packet`] carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// A complete handshake message, 12 byte header included.
    Handshake(Vec<u8>),
    ChangeCipherSpec,
    Alert(Alert),
}

/// One outgoing record as produced by a flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub epoch: u16,
    pub content: Content,
    pub should_encrypt: bool,
    pub reset_local_sequence_number: bool,
}

impl Packet {
    pub fn handshake(epoch: u16, data: Vec<u8>) -> Self {
        Packet {
            epoch,
            content: Content::Handshake(data),
            should_encrypt: epoch > 0,
            reset_local_sequence_number: false,
        }
    }

    pub fn change_cipher_spec() -> Self {
        Packet {
            epoch: 0,
            content: Content::ChangeCipherSpec,
            should_encrypt: false,
            reset_local_sequence_number: false,
        }
    }

    pub fn alert(epoch: u16, level: AlertLevel, description: AlertDescription) -> Self {
        Packet {
            epoch,
            content: Content::Alert(Alert::new(level, description)),
            should_encrypt: epoch > 0,
            reset_local_sequence_number: false,
        }
    }
}

/// A handshake message delivered by the record layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    /// Record epoch the message arrived in.
    pub epoch: u16,
    /// Header and body.
    pub data: Vec<u8>,
}

/// Everything the flight state machine needs from the record layer and the
/// transport underneath it.
///
/// Implementations frame [`Packet`]s into records, protect them with
/// `state.cipher_suite()` when `should_encrypt` is set and deliver received
/// handshake messages back. Records for an epoch whose keys are not yet known
/// are queued until [`FlightConn::handle_queued_packets`] is called.
pub trait FlightConn {
    fn write_packets(
        &mut self,
        ctx: &Context,
        state: &State,
        packets: &[Packet],
    ) -> Result<(), Error>;

    /// Decrypt the records that arrived before the keys existed.
    fn handle_queued_packets(
        &mut self,
        ctx: &Context,
        state: &State,
    ) -> Result<Vec<HandshakeMessage>, Error>;

    fn notify(
        &mut self,
        ctx: &Context,
        state: &State,
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), Error>;

    /// Block until handshake messages arrive, `timeout` passes or `ctx` is done.
    ///
    /// `Ok(None)` means the timeout passed. A fatal alert from the peer is
    /// returned as [`Error::AlertReceived`].
    fn recv_handshake(
        &mut self,
        ctx: &Context,
        state: &State,
        timeout: Duration,
    ) -> Result<Option<Vec<HandshakeMessage>>, Error>;

    fn set_local_epoch(&mut self, epoch: u16);
}
