//! Shared helpers for the handshake integration tests.
//!
//! [`PipeConn`] is an in-memory record layer: every packet becomes one DTLS
//! record in its own datagram, carried over a channel that can lose,
//! duplicate and reorder datagrams.

#![allow(unused)]

use std::mem;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use flightdtls::message::ProtocolVersion;
use flightdtls::record::{ContentType, RecordHeader};
use flightdtls::{
    Alert, AlertDescription, AlertLevel, CertifiedKey, CipherSuite, Content, Context, Error,
    FlightConn, HandshakeConfig, HandshakeFsm, HandshakeMessage, HandshakeState, Packet, State,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const POLL: Duration = Duration::from_millis(10);

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Self-signed ECDSA P-256 certificate for `name`, DER certificate plus key.
pub fn certificate(name: &str) -> (Vec<u8>, CertifiedKey) {
    let cert = rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
    let der = cert.serialize_der().unwrap();
    let key = CertifiedKey::from_der(der.clone(), &cert.serialize_private_key_der()).unwrap();
    (der, key)
}

/// Per datagram probabilities of the channel misbehaving.
#[derive(Debug, Clone, Copy, Default)]
pub struct Impairment {
    pub loss: f64,
    pub duplicate: f64,
    pub reorder: f64,
}

impl Impairment {
    pub fn none() -> Self {
        Self::default()
    }
}

pub struct PipeConn {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    impairment: Impairment,
    rng: StdRng,
    /// Held back to be delivered after the next datagram.
    held: Option<Vec<u8>>,
    /// Next record sequence number, per epoch.
    sequence_numbers: Vec<u64>,
    local_epoch: u16,
    /// Protected records that arrived before we had the keys.
    queued: Vec<Vec<u8>>,
    drop_encrypted_handshakes: usize,
    pub datagrams_sent: usize,
    pub flights_written: usize,
    pub alerts_sent: Vec<AlertDescription>,
}

/// Two connected ends.
pub fn pipe(impairment: Impairment, seed: u64) -> (PipeConn, PipeConn) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        PipeConn::new(a_tx, a_rx, impairment, seed),
        PipeConn::new(b_tx, b_rx, impairment, seed.wrapping_add(1)),
    )
}

impl PipeConn {
    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>, impairment: Impairment, seed: u64) -> Self {
        PipeConn {
            tx,
            rx,
            impairment,
            rng: StdRng::seed_from_u64(seed),
            held: None,
            sequence_numbers: vec![0],
            local_epoch: 0,
            queued: Vec::new(),
            drop_encrypted_handshakes: 0,
            datagrams_sent: 0,
            flights_written: 0,
            alerts_sent: Vec::new(),
        }
    }

    /// Silently lose the next `count` epoch 1 handshake records we send.
    pub fn drop_encrypted_handshakes(&mut self, count: usize) {
        self.drop_encrypted_handshakes = count;
    }

    pub fn local_epoch(&self) -> u16 {
        self.local_epoch
    }

    fn send_datagram(&mut self, datagram: Vec<u8>) {
        self.datagrams_sent += 1;
        let Impairment {
            loss,
            duplicate,
            reorder,
        } = self.impairment;

        if self.rng.gen_bool(loss) {
            return;
        }
        if self.held.is_none() && self.rng.gen_bool(reorder) {
            self.held = Some(datagram);
            return;
        }

        // A closed channel means the peer is gone, same as a lost datagram.
        let _ = self.tx.send(datagram.clone());
        if self.rng.gen_bool(duplicate) {
            let _ = self.tx.send(datagram);
        }
        if let Some(held) = self.held.take() {
            let _ = self.tx.send(held);
        }
    }

    fn record(&mut self, state: &State, packet: &Packet) -> Result<Vec<u8>, Error> {
        let (content_type, fragment) = match &packet.content {
            Content::Handshake(data) => (ContentType::Handshake, data.clone()),
            Content::ChangeCipherSpec => (ContentType::ChangeCipherSpec, vec![1]),
            Content::Alert(alert) => {
                let mut out = Vec::new();
                alert.serialize(&mut out);
                (ContentType::Alert, out)
            }
        };

        let epoch = packet.epoch as usize;
        if self.sequence_numbers.len() <= epoch {
            self.sequence_numbers.resize(epoch + 1, 0);
        }
        let sequence_number = self.sequence_numbers[epoch];
        self.sequence_numbers[epoch] += 1;

        let header = RecordHeader {
            content_type,
            version: ProtocolVersion::DTLS1_2,
            epoch: packet.epoch,
            sequence_number,
            length: fragment.len() as u16,
        };

        if packet.should_encrypt {
            return state.cipher_suite().encrypt(&header, &fragment);
        }
        let mut out = Vec::new();
        header.serialize(&mut out);
        out.extend_from_slice(&fragment);
        Ok(out)
    }

    fn handle_datagram(
        &mut self,
        state: &State,
        datagram: &[u8],
    ) -> Result<Vec<HandshakeMessage>, Error> {
        let Ok((_, (header, _))) = RecordHeader::parse_record(datagram) else {
            return Ok(Vec::new());
        };

        if header.content_type == ContentType::ChangeCipherSpec {
            state.epochs().set_remote(header.epoch + 1);
            return Ok(Vec::new());
        }
        if header.epoch > 0 && !has_keys(state) {
            self.queued.push(datagram.to_vec());
            return Ok(Vec::new());
        }

        open(state, datagram)
    }
}

fn has_keys(state: &State) -> bool {
    matches!(state.cipher_suite(), CipherSuite::Gcm { keys: Some(_), .. })
}

fn open(state: &State, datagram: &[u8]) -> Result<Vec<HandshakeMessage>, Error> {
    let plain = match RecordHeader::parse_record(datagram) {
        Ok((_, (header, _))) if header.epoch > 0 => match state.cipher_suite().decrypt(datagram) {
            Ok(plain) => plain,
            // Tampered or from another connection, drop it.
            Err(_) => return Ok(Vec::new()),
        },
        Ok(_) => datagram.to_vec(),
        Err(_) => return Ok(Vec::new()),
    };

    let Ok((_, (header, fragment))) = RecordHeader::parse_record(&plain) else {
        return Ok(Vec::new());
    };

    match header.content_type {
        ContentType::Handshake => Ok(vec![HandshakeMessage {
            epoch: header.epoch,
            data: fragment.to_vec(),
        }]),
        ContentType::Alert => match Alert::parse(fragment) {
            Ok((_, alert)) if alert.level == AlertLevel::Fatal => {
                Err(Error::AlertReceived(alert.description))
            }
            _ => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

impl FlightConn for PipeConn {
    fn write_packets(
        &mut self,
        _ctx: &Context,
        state: &State,
        packets: &[Packet],
    ) -> Result<(), Error> {
        self.flights_written += 1;
        for packet in packets {
            let datagram = self.record(state, packet)?;

            let encrypted_handshake =
                packet.epoch > 0 && matches!(packet.content, Content::Handshake(_));
            if encrypted_handshake && self.drop_encrypted_handshakes > 0 {
                self.drop_encrypted_handshakes -= 1;
                continue;
            }

            self.send_datagram(datagram);
        }
        Ok(())
    }

    fn handle_queued_packets(
        &mut self,
        _ctx: &Context,
        state: &State,
    ) -> Result<Vec<HandshakeMessage>, Error> {
        let mut messages = Vec::new();
        for datagram in mem::take(&mut self.queued) {
            messages.extend(open(state, &datagram)?);
        }
        Ok(messages)
    }

    fn notify(
        &mut self,
        _ctx: &Context,
        state: &State,
        level: AlertLevel,
        description: AlertDescription,
    ) -> Result<(), Error> {
        self.alerts_sent.push(description);
        let packet = Packet::alert(self.local_epoch, level, description);
        let datagram = self.record(state, &packet)?;
        let _ = self.tx.send(datagram);
        Ok(())
    }

    fn recv_handshake(
        &mut self,
        ctx: &Context,
        state: &State,
        timeout: Duration,
    ) -> Result<Option<Vec<HandshakeMessage>>, Error> {
        if let Some(held) = self.held.take() {
            let _ = self.tx.send(held);
        }

        let deadline = Instant::now() + timeout;
        loop {
            ctx.check()?;
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(None);
            }

            let datagram = match self.rx.recv_timeout(left.min(POLL)) {
                Ok(datagram) => datagram,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(left.min(POLL));
                    continue;
                }
            };

            let mut messages = self.handle_datagram(state, &datagram)?;
            while let Ok(datagram) = self.rx.try_recv() {
                messages.extend(self.handle_datagram(state, &datagram)?);
            }
            if !messages.is_empty() {
                return Ok(Some(messages));
            }
        }
    }

    fn set_local_epoch(&mut self, epoch: u16) {
        self.local_epoch = epoch;
    }
}

pub struct Outcome {
    pub client: Result<State, Error>,
    pub server: Result<State, Error>,
    pub client_conn: PipeConn,
    pub server_conn: PipeConn,
    /// Server secrets when `run` returned, before lingering.
    pub server_finished: Option<SessionSecrets>,
    /// Server FSM state once lingering ended.
    pub server_after_linger: Option<HandshakeState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSecrets {
    pub master_secret: Vec<u8>,
    pub local_verify_data: Vec<u8>,
}

impl SessionSecrets {
    pub fn of(state: &State) -> Self {
        SessionSecrets {
            master_secret: state.master_secret().to_vec(),
            local_verify_data: state.local_verify_data().to_vec(),
        }
    }
}

/// Run a client and a server against each other on two threads.
///
/// The server lingers after finishing until the client is done, so a lost
/// final flight can still be answered.
pub fn handshake(
    client_cfg: HandshakeConfig,
    server_cfg: HandshakeConfig,
    configure: impl FnOnce(&mut PipeConn, &mut PipeConn),
    impairment: Impairment,
    seed: u64,
) -> Outcome {
    let (mut client_conn, mut server_conn) = pipe(impairment, seed);
    configure(&mut client_conn, &mut server_conn);

    let linger = Context::new();
    let server_linger = linger.clone();

    let server = thread::spawn(move || {
        let mut finished = None;
        let mut after_linger = None;
        let result = HandshakeFsm::server(server_cfg).and_then(|mut fsm| {
            fsm.run(&mut server_conn, &Context::new())?;
            finished = Some(SessionSecrets::of(fsm.state()));
            fsm.linger(&mut server_conn, &server_linger)?;
            after_linger = Some(fsm.handshake_state());
            Ok(fsm.into_state())
        });
        (result, server_conn, finished, after_linger)
    });

    let client = thread::spawn(move || {
        let mut fsm = HandshakeFsm::client(client_cfg);
        let result = fsm
            .run(&mut client_conn, &Context::new())
            .map(|_| fsm.into_state());
        (result, client_conn)
    });

    let (client, client_conn) = client.join().unwrap();
    linger.cancel();
    let (server, server_conn, server_finished, server_after_linger) = server.join().unwrap();

    Outcome {
        client,
        server,
        client_conn,
        server_conn,
        server_finished,
        server_after_linger,
    }
}
