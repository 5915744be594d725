use std::time::Duration;

use crate::alert::{AlertDescription, AlertLevel};
use crate::conn::{FlightConn, HandshakeMessage, Packet};
use crate::context::Context;
use crate::crypto::CertifiedKey;
use crate::state::State;
use crate::Error;

/// Self-signed ECDSA P-256 certificate and its PKCS#8 key, both DER.
pub fn self_signed(name: &str) -> (Vec<u8>, Vec<u8>) {
    let cert = rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
    (
        cert.serialize_der().unwrap(),
        cert.serialize_private_key_der(),
    )
}

pub fn certified_key(name: &str) -> CertifiedKey {
    let (cert, key) = self_signed(name);
    CertifiedKey::from_der(cert, &key).unwrap()
}

/// Accepts every write and never receives anything.
#[derive(Debug, Default)]
pub struct NullConn {
    pub written: Vec<Packet>,
}

impl FlightConn for NullConn {
    fn write_packets(&mut self, _: &Context, _: &State, packets: &[Packet]) -> Result<(), Error> {
        self.written.extend_from_slice(packets);
        Ok(())
    }

    fn handle_queued_packets(
        &mut self,
        _: &Context,
        _: &State,
    ) -> Result<Vec<HandshakeMessage>, Error> {
        Ok(Vec::new())
    }

    fn notify(
        &mut self,
        _: &Context,
        _: &State,
        _: AlertLevel,
        _: AlertDescription,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn recv_handshake(
        &mut self,
        _: &Context,
        _: &State,
        _: Duration,
    ) -> Result<Option<Vec<HandshakeMessage>>, Error> {
        Ok(None)
    }

    fn set_local_epoch(&mut self, _: u16) {}
}
