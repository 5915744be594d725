//! The flight state machine.
//!
//! ```text
//!            +-----------+
//!            | Preparing | <--------------------+
//!            +-----------+                      |
//!                  |                            |
//!                  | generate the flight        |
//!                  v                            |
//!            +-----------+                      |
//!            |  Sending  | <-----------+        |
//!            +-----------+             |        |
//!                  |                   |        |
//!   last send      | otherwise         | timer  | next flight
//!   flight         v                   | or     | parsed
//!     |      +-----------+             | stale  |
//!     |      |  Waiting  | ------------+ resend |
//!     |      +-----------+ ---------------------+
//!     |            |
//!     |            | last receive flight parsed
//!     v            v
//!            +-----------+
//!            | Finished  |
//!            +-----------+
//! ```
//!
//! Any error sends the fatal alert it maps to and ends in `Errored`.

use std::fmt;
use std::time::{Duration, Instant};

use crate::alert::AlertLevel;
use crate::cache::HandshakeCache;
use crate::config::HandshakeConfig;
use crate::conn::{FlightConn, Packet};
use crate::context::Context;
use crate::flight::{cache_received, Flight, Received};
use crate::state::State;
use crate::timer::ExponentialBackoff;
use crate::Error;

/// Where the state machine is within the current flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Errored,
    Preparing,
    Sending,
    Waiting,
    Finished,
}

impl HandshakeState {
    fn name(&self) -> &'static str {
        match self {
            HandshakeState::Errored => "Errored",
            HandshakeState::Preparing => "Preparing",
            HandshakeState::Sending => "Sending",
            HandshakeState::Waiting => "Waiting",
            HandshakeState::Finished => "Finished",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type FlightStateObserver = Box<dyn FnMut(Flight, HandshakeState) + Send>;

/// Drives one side of the handshake through its flights.
pub struct HandshakeFsm {
    current_flight: Flight,
    handshake_state: HandshakeState,
    /// The packets of the current flight, resent verbatim.
    flights: Vec<Packet>,
    retransmit: bool,
    state: State,
    cache: HandshakeCache,
    cfg: HandshakeConfig,
    backoff: ExponentialBackoff,
    last_resend: Option<Instant>,
    linger_resends: usize,
    on_flight_state: Option<FlightStateObserver>,
}

impl HandshakeFsm {
    pub fn new(
        mut state: State,
        cache: HandshakeCache,
        cfg: HandshakeConfig,
        initial_flight: Flight,
    ) -> Self {
        let backoff =
            ExponentialBackoff::new(cfg.flight_start_rto(), cfg.flight_retries(), &mut state.rng);

        HandshakeFsm {
            current_flight: initial_flight,
            handshake_state: HandshakeState::Preparing,
            flights: Vec::new(),
            retransmit: false,
            state,
            cache,
            cfg,
            backoff,
            last_resend: None,
            linger_resends: 0,
            on_flight_state: None,
        }
    }

    /// A client starting with its first ClientHello.
    pub fn client(cfg: HandshakeConfig) -> Self {
        let state = State::new(true, cfg.rng_seed());
        Self::new(state, HandshakeCache::new(), cfg, Flight::Flight1)
    }

    /// A server waiting for a ClientHello.
    pub fn server(cfg: HandshakeConfig) -> Result<Self, Error> {
        if !cfg.is_psk() && !cfg.has_certificate() {
            return Err(Error::ServerMustHaveCertificate);
        }
        let state = State::new(false, cfg.rng_seed());
        Ok(Self::new(state, HandshakeCache::new(), cfg, Flight::Flight0))
    }

    /// Called on every state the machine enters.
    pub fn on_flight_state(&mut self, observer: impl FnMut(Flight, HandshakeState) + Send + 'static) {
        self.on_flight_state = Some(Box::new(observer));
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn into_state(self) -> State {
        self.state
    }

    pub fn cache(&self) -> &HandshakeCache {
        &self.cache
    }

    pub fn current_flight(&self) -> Flight {
        self.current_flight
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake_state
    }

    /// Run the handshake until it is finished or fails.
    ///
    /// The configured handshake timeout applies on top of `ctx`.
    pub fn run(&mut self, conn: &mut dyn FlightConn, ctx: &Context) -> Result<(), Error> {
        let ctx = ctx.timeout(self.cfg.handshake_timeout());

        loop {
            let next = match self.handshake_state {
                HandshakeState::Finished => return Ok(()),
                HandshakeState::Errored => {
                    return Err(Error::UnexpectedMessage(
                        "Handshake already failed".to_string(),
                    ))
                }
                _ => ctx.check().and_then(|_| self.make_progress(conn, &ctx)),
            };

            match next {
                Ok(next) => self.transition(next),
                Err(e) => {
                    debug!("[handshake:{}] {}: {}", self.side(), self.current_flight, e);
                    self.transition(HandshakeState::Errored);
                    return Err(e);
                }
            }
        }
    }

    /// Keep answering the peer after [`HandshakeFsm::run`] returned.
    ///
    /// The side that sent the last flight cannot know it arrived. When the
    /// peer repeats its final flight, ours is sent again. Returns once `ctx`
    /// is done.
    pub fn linger(&mut self, conn: &mut dyn FlightConn, ctx: &Context) -> Result<(), Error> {
        if self.handshake_state != HandshakeState::Finished {
            return Err(Error::UnexpectedMessage(
                "Handshake is not finished".to_string(),
            ));
        }

        loop {
            if ctx.check().is_err() {
                return Ok(());
            }

            let wait = ctx.clamp(self.cfg.flight_start_rto());
            let messages = match conn.recv_handshake(ctx, &self.state, wait) {
                Ok(Some(messages)) => messages,
                Ok(None) => continue,
                Err(e) if e.is_cancelled() || e.is_timeout() => return Ok(()),
                Err(e) => return Err(e),
            };

            let received = cache_received(&mut self.cache, &self.state, messages);
            let resend = match self.parse(conn, ctx)? {
                // The client absorbs a repeated server flight.
                Some(flight) if flight.is_last_recv_flight() => false,
                Some(_) => true,
                None => received.is_stale_retransmit() && !self.state.is_client,
            };

            if !resend || self.resent_recently(self.cfg.flight_start_rto() / 2) {
                continue;
            }
            if self.linger_resends >= self.cfg.flight_retries() {
                debug!(
                    "[handshake:{}] {} resend limit reached, stop answering",
                    self.side(),
                    self.current_flight
                );
                return Ok(());
            }
            self.linger_resends += 1;
            debug!(
                "[handshake:{}] peer repeated its flight, resending {}",
                self.side(),
                self.current_flight
            );
            conn.write_packets(ctx, &self.state, &self.flights)?;
        }
    }

    fn make_progress(
        &mut self,
        conn: &mut dyn FlightConn,
        ctx: &Context,
    ) -> Result<HandshakeState, Error> {
        match self.handshake_state {
            HandshakeState::Preparing => self.prepare(conn, ctx),
            HandshakeState::Sending => self.send(conn, ctx),
            HandshakeState::Waiting => self.wait(conn, ctx),
            HandshakeState::Finished | HandshakeState::Errored => Ok(self.handshake_state),
        }
    }

    fn transition(&mut self, next: HandshakeState) {
        if next != self.handshake_state {
            debug!(
                "[handshake:{}] {}: {} -> {}",
                self.side(),
                self.current_flight,
                self.handshake_state,
                next
            );
        }
        self.handshake_state = next;
        if let Some(observer) = &mut self.on_flight_state {
            observer(self.current_flight, next);
        }
    }

    fn prepare(&mut self, conn: &mut dyn FlightConn, ctx: &Context) -> Result<HandshakeState, Error> {
        self.flights.clear();
        self.backoff.reset(&mut self.state.rng);

        let generated = self
            .current_flight
            .generate(&mut self.state, &mut self.cache, &self.cfg);
        let packets = match generated {
            Ok(packets) => packets,
            Err(e) => {
                self.send_alert(conn, ctx, &e);
                return Err(e);
            }
        };

        let epoch = packets.iter().map(|p| p.epoch).max().unwrap_or_default();
        if epoch > self.state.local_epoch() {
            trace!("[handshake:{}] local epoch {}", self.side(), epoch);
            self.state.epochs.set_local(epoch);
            conn.set_local_epoch(epoch);
        }

        self.retransmit = self.current_flight.has_retransmit();
        self.flights = packets;

        Ok(HandshakeState::Sending)
    }

    fn send(&mut self, conn: &mut dyn FlightConn, ctx: &Context) -> Result<HandshakeState, Error> {
        if !self.flights.is_empty() {
            trace!(
                "[handshake:{}] {}: write {} packets",
                self.side(),
                self.current_flight,
                self.flights.len()
            );
            conn.write_packets(ctx, &self.state, &self.flights)?;
        }

        if self.current_flight.is_last_send_flight() {
            Ok(HandshakeState::Finished)
        } else {
            Ok(HandshakeState::Waiting)
        }
    }

    fn wait(&mut self, conn: &mut dyn FlightConn, ctx: &Context) -> Result<HandshakeState, Error> {
        let deadline = Instant::now() + ctx.clamp(self.backoff.rto());

        loop {
            ctx.check()?;

            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return self.on_timeout();
            }

            let Some(messages) = conn.recv_handshake(ctx, &self.state, left)? else {
                return self.on_timeout();
            };

            let received = cache_received(&mut self.cache, &self.state, messages);
            match self.parse(conn, ctx)? {
                Some(next) => {
                    if next.is_last_recv_flight() && next == self.current_flight {
                        return Ok(HandshakeState::Finished);
                    }
                    trace!(
                        "[handshake:{}] {} -> {}",
                        self.side(),
                        self.current_flight,
                        next
                    );
                    self.current_flight = next;
                    return Ok(HandshakeState::Preparing);
                }
                None => {
                    if self.should_resend_early(&received) {
                        debug!(
                            "[handshake:{}] peer retransmitted, resending {}",
                            self.side(),
                            self.current_flight
                        );
                        return Ok(HandshakeState::Sending);
                    }
                }
            }
        }
    }

    /// The peer repeating an old flight means ours was lost. Answering
    /// each copy would flood it, so at most once per half rto.
    fn should_resend_early(&mut self, received: &Received) -> bool {
        if !received.is_stale_retransmit() || !self.retransmit || self.flights.is_empty() {
            return false;
        }

        !self.resent_recently(self.backoff.rto() / 2)
    }

    /// Whether we resent within `min_gap`. Otherwise counts as a resend now.
    fn resent_recently(&mut self, min_gap: Duration) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_resend {
            if now.saturating_duration_since(last) < min_gap {
                return true;
            }
        }
        self.last_resend = Some(now);
        false
    }

    fn on_timeout(&mut self) -> Result<HandshakeState, Error> {
        // Nothing of ours to repeat, the peer has to speak first.
        if !self.retransmit || self.flights.is_empty() {
            return Ok(HandshakeState::Waiting);
        }

        if !self.backoff.can_retry() {
            warn!(
                "[handshake:{}] {}: giving up after {} retransmissions",
                self.side(),
                self.current_flight,
                self.cfg.flight_retries()
            );
            return Err(Error::RetransmitLimit);
        }

        self.backoff.attempt(&mut self.state.rng);
        debug!(
            "[handshake:{}] {} timed out, retransmit (next rto {:?})",
            self.side(),
            self.current_flight,
            self.backoff.rto()
        );
        Ok(HandshakeState::Sending)
    }

    fn parse(&mut self, conn: &mut dyn FlightConn, ctx: &Context) -> Result<Option<Flight>, Error> {
        let parsed = self.current_flight.parse(
            conn,
            ctx,
            &mut self.state,
            &mut self.cache,
            &self.cfg,
        );
        if let Err(e) = &parsed {
            self.send_alert(conn, ctx, e);
        }
        parsed
    }

    fn send_alert(&mut self, conn: &mut dyn FlightConn, ctx: &Context, err: &Error) {
        let Some(description) = err.alert_description() else {
            return;
        };
        warn!(
            "[handshake:{}] {}: {}, sending fatal alert {:?}",
            self.side(),
            self.current_flight,
            err,
            description
        );
        if let Err(e) = conn.notify(ctx, &self.state, AlertLevel::Fatal, description) {
            debug!("[handshake:{}] failed to send alert: {}", self.side(), e);
        }
    }

    fn side(&self) -> &'static str {
        if self.state.is_client {
            "client"
        } else {
            "server"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDescription;
    use crate::conn::{Content, HandshakeMessage};
    use crate::test_util::certified_key;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted peer: hands out queued receives and records writes.
    #[derive(Default)]
    struct ScriptConn {
        incoming: VecDeque<Option<Vec<HandshakeMessage>>>,
        written: Vec<Vec<Packet>>,
        alerts: Vec<AlertDescription>,
        local_epoch: u16,
    }

    impl FlightConn for ScriptConn {
        fn write_packets(&mut self, _: &Context, _: &State, packets: &[Packet]) -> Result<(), Error> {
            self.written.push(packets.to_vec());
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
            description: AlertDescription,
        ) -> Result<(), Error> {
            self.alerts.push(description);
            Ok(())
        }

        fn recv_handshake(
            &mut self,
            _: &Context,
            _: &State,
            _: Duration,
        ) -> Result<Option<Vec<HandshakeMessage>>, Error> {
            match self.incoming.pop_front() {
                Some(next) => Ok(next),
                None => Err(Error::Transport("script exhausted".to_string())),
            }
        }

        fn set_local_epoch(&mut self, epoch: u16) {
            self.local_epoch = epoch;
        }
    }

    fn client_config(retries: usize) -> HandshakeConfig {
        HandshakeConfig::builder()
            .flight_start_rto(Duration::from_millis(1))
            .flight_retries(retries)
            .rng_seed(11)
            .build()
            .unwrap()
    }

    #[test]
    fn retransmits_identical_packets() {
        let mut fsm = HandshakeFsm::client(client_config(3));
        let mut conn = ScriptConn::default();
        conn.incoming.extend([None, None]);

        // Two timeouts, then the script ends with a transport error.
        let err = fsm.run(&mut conn, &Context::new()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        assert_eq!(conn.written.len(), 3);
        assert_eq!(conn.written[0], conn.written[1]);
        assert_eq!(conn.written[1], conn.written[2]);
        assert!(matches!(conn.written[0][0].content, Content::Handshake(_)));
        assert!(conn.alerts.is_empty());
    }

    #[test]
    fn retransmit_limit() {
        let mut fsm = HandshakeFsm::client(client_config(2));
        let mut conn = ScriptConn::default();
        conn.incoming.extend([None, None, None]);

        let err = fsm.run(&mut conn, &Context::new()).unwrap_err();
        assert_eq!(err, Error::RetransmitLimit);
        assert!(err.is_timeout());
        assert_eq!(conn.written.len(), 3);
        assert_eq!(fsm.handshake_state(), HandshakeState::Errored);
    }

    #[test]
    fn cancelled_before_start() {
        let mut fsm = HandshakeFsm::client(client_config(3));
        let mut conn = ScriptConn::default();
        let ctx = Context::new();
        ctx.cancel();

        assert_eq!(fsm.run(&mut conn, &ctx).unwrap_err(), Error::Cancelled);
        assert!(conn.written.is_empty());
        assert!(conn.alerts.is_empty());
    }

    #[test]
    fn peer_alert_is_not_answered() {
        struct AlertingConn(ScriptConn);
        impl FlightConn for AlertingConn {
            fn write_packets(&mut self, c: &Context, s: &State, p: &[Packet]) -> Result<(), Error> {
                self.0.write_packets(c, s, p)
            }
            fn handle_queued_packets(
                &mut self,
                c: &Context,
                s: &State,
            ) -> Result<Vec<HandshakeMessage>, Error> {
                self.0.handle_queued_packets(c, s)
            }
            fn notify(
                &mut self,
                c: &Context,
                s: &State,
                l: AlertLevel,
                d: AlertDescription,
            ) -> Result<(), Error> {
                self.0.notify(c, s, l, d)
            }
            fn recv_handshake(
                &mut self,
                _: &Context,
                _: &State,
                _: Duration,
            ) -> Result<Option<Vec<HandshakeMessage>>, Error> {
                Err(Error::AlertReceived(AlertDescription::HandshakeFailure))
            }
            fn set_local_epoch(&mut self, epoch: u16) {
                self.0.set_local_epoch(epoch)
            }
        }

        let mut fsm = HandshakeFsm::client(client_config(3));
        let mut conn = AlertingConn(ScriptConn::default());
        let err = fsm.run(&mut conn, &Context::new()).unwrap_err();

        assert_eq!(err, Error::AlertReceived(AlertDescription::HandshakeFailure));
        assert!(conn.0.alerts.is_empty());
    }

    #[test]
    fn parse_error_sends_alert() {
        use crate::message::{Body, Cookie, Handshake, HelloVerifyRequest, ProtocolVersion};

        let mut fsm = HandshakeFsm::client(client_config(3));
        let mut conn = ScriptConn::default();
        let hvr = Handshake::new(
            0,
            Body::HelloVerifyRequest(HelloVerifyRequest::new(
                ProtocolVersion::Unknown(0x0101),
                Cookie::try_new(&[1; 4]).unwrap(),
            )),
        )
        .to_bytes();
        conn.incoming
            .push_back(Some(vec![HandshakeMessage { epoch: 0, data: hvr }]));

        let err = fsm.run(&mut conn, &Context::new()).unwrap_err();
        assert_eq!(err, Error::UnsupportedProtocolVersion);
        assert_eq!(conn.alerts, vec![AlertDescription::ProtocolVersion]);
    }

    #[test]
    fn observer_sees_every_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut fsm = HandshakeFsm::client(client_config(0));
        let log = seen.clone();
        fsm.on_flight_state(move |flight, state| log.lock().unwrap().push((flight, state)));

        let mut conn = ScriptConn::default();
        conn.incoming.push_back(None);
        assert_eq!(
            fsm.run(&mut conn, &Context::new()).unwrap_err(),
            Error::RetransmitLimit
        );

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (Flight::Flight1, HandshakeState::Sending),
                (Flight::Flight1, HandshakeState::Waiting),
                (Flight::Flight1, HandshakeState::Errored),
            ]
        );
    }

    #[test]
    fn server_needs_certificate_or_psk() {
        let cfg = HandshakeConfig::default();
        assert_eq!(
            HandshakeFsm::server(cfg).err(),
            Some(Error::ServerMustHaveCertificate)
        );

        let cfg = HandshakeConfig::builder()
            .certificate(certified_key("server"))
            .build()
            .unwrap();
        let fsm = HandshakeFsm::server(cfg).unwrap();
        assert_eq!(fsm.current_flight(), Flight::Flight0);
        assert!(!fsm.state().is_client());
    }

    #[test]
    fn idle_server_does_not_give_up() {
        let cfg = HandshakeConfig::builder()
            .certificate(certified_key("server"))
            .flight_start_rto(Duration::from_millis(1))
            .flight_retries(0)
            .build()
            .unwrap();
        let mut fsm = HandshakeFsm::server(cfg).unwrap();
        let mut conn = ScriptConn::default();
        conn.incoming.extend([None, None, None]);

        let err = fsm.run(&mut conn, &Context::new()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(conn.written.is_empty());
    }
}
