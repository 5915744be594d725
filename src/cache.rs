//! Append only store of the handshake messages seen on a connection.
//!
//! Every handshake message we send or receive is pushed here once, keyed by
//! `(message_sequence, is_client)`. Flights query the cache with [`PullRule`]s
//! to find complete peer flights and to rebuild the exact transcript bytes
//! that signatures and Finished verify data are computed over.

use std::collections::HashMap;

use nom::combinator::all_consuming;

use crate::crypto::digest;
use crate::message::{
    Body, Certificate, CertificateRequest, CertificateVerify, ClientHello, ClientKeyExchange,
    Finished, Handshake, HashAlgorithm, HelloVerifyRequest, MessageType, ServerHello,
    ServerKeyExchange, HEADER_LENGTH,
};
use crate::Error;

/// One handshake message, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    pub typ: MessageType,
    pub is_client: bool,
    pub epoch: u16,
    pub message_sequence: u16,
    pub data: Vec<u8>,
}

/// Query for the newest message of a type sent by one side in one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullRule {
    pub typ: MessageType,
    pub epoch: u16,
    pub is_client: bool,
    pub optional: bool,
}

impl PullRule {
    pub const fn new(typ: MessageType, epoch: u16, is_client: bool, optional: bool) -> Self {
        PullRule {
            typ,
            epoch,
            is_client,
            optional,
        }
    }
}

#[derive(Debug, Default)]
pub struct HandshakeCache {
    items: Vec<CacheItem>,
}

impl HandshakeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert a message unless one with the same sequence from the same side
    /// is already cached. Returns whether the message was new.
    pub fn push(
        &mut self,
        data: Vec<u8>,
        epoch: u16,
        message_sequence: u16,
        typ: MessageType,
        is_client: bool,
    ) -> bool {
        let exists = self
            .items
            .iter()
            .any(|i| i.message_sequence == message_sequence && i.is_client == is_client);
        if exists {
            trace!(
                "Cache already holds seq {} from {}",
                message_sequence,
                side(is_client)
            );
            return false;
        }

        trace!(
            "Cache push {:?} seq {} epoch {} from {}",
            typ,
            message_sequence,
            epoch,
            side(is_client)
        );
        self.items.push(CacheItem {
            typ,
            is_client,
            epoch,
            message_sequence,
            data,
        });
        true
    }

    fn newest(&self, rule: &PullRule) -> Option<&CacheItem> {
        self.items
            .iter()
            .filter(|i| i.typ == rule.typ && i.is_client == rule.is_client && i.epoch == rule.epoch)
            .max_by_key(|i| i.message_sequence)
    }

    /// The newest matching message per rule.
    pub fn pull(&self, rules: &[PullRule]) -> Vec<Option<&CacheItem>> {
        rules.iter().map(|r| self.newest(r)).collect()
    }

    /// Concatenated raw bytes of the pulled messages in rule order. Unmatched
    /// rules are skipped.
    pub fn pull_and_merge(&self, rules: &[PullRule]) -> Vec<u8> {
        let mut merged = Vec::new();
        for item in self.pull(rules).into_iter().flatten() {
            merged.extend_from_slice(&item.data);
        }
        merged
    }

    /// Pull a complete peer flight.
    ///
    /// Succeeds when every required rule matched, every matched message parses
    /// and the matched messages carry consecutive sequence numbers starting at
    /// `start_seq`. Returns the sequence number following the flight.
    pub fn full_pull_map(
        &self,
        start_seq: u16,
        rules: &[PullRule],
    ) -> Option<(u16, PulledMessages<'_>)> {
        let mut matched = Vec::with_capacity(rules.len());
        for rule in rules {
            let item = self.newest(rule);
            if item.is_none() && !rule.optional {
                return None;
            }
            matched.push(item);
        }

        let mut seq = start_seq;
        let mut messages = PulledMessages::default();
        for item in matched.into_iter().flatten() {
            let Ok((_, handshake)) = Handshake::parse(&item.data) else {
                debug!("Cached {:?} seq {} does not parse", item.typ, item.message_sequence);
                return None;
            };
            if handshake.header.message_seq != seq {
                // A gap, part of the flight has not arrived yet.
                return None;
            }
            seq = seq.wrapping_add(1);
            let end = HEADER_LENGTH + handshake.header.length as usize;
            messages.raw.insert(item.typ, &item.data[HEADER_LENGTH..end]);
            messages.bodies.insert(item.typ, handshake.body);
        }

        if messages.is_empty() {
            return None;
        }

        Some((seq, messages))
    }

    /// Hash over ClientHello through ClientKeyExchange, RFC 7627 Section 3.
    pub fn session_hash(
        &self,
        hash: HashAlgorithm,
        epoch: u16,
        additional: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut merged = self.pull_and_merge(&[
            PullRule::new(MessageType::ClientHello, epoch, true, false),
            PullRule::new(MessageType::ServerHello, epoch, false, false),
            PullRule::new(MessageType::Certificate, epoch, false, false),
            PullRule::new(MessageType::ServerKeyExchange, epoch, false, false),
            PullRule::new(MessageType::CertificateRequest, epoch, false, false),
            PullRule::new(MessageType::ServerHelloDone, epoch, false, false),
            PullRule::new(MessageType::Certificate, epoch, true, false),
            PullRule::new(MessageType::ClientKeyExchange, epoch, true, false),
        ]);
        merged.extend_from_slice(additional);
        digest(hash, &merged)
    }
}

fn side(is_client: bool) -> &'static str {
    if is_client {
        "client"
    } else {
        "server"
    }
}

/// Parsed messages of a flight, by message type.
///
/// Key exchange bodies are kept raw as well, their shape depends on the
/// negotiated suite.
#[derive(Debug, Default)]
pub struct PulledMessages<'a> {
    bodies: HashMap<MessageType, Body<'a>>,
    raw: HashMap<MessageType, &'a [u8]>,
}

macro_rules! pulled {
    ($fn:ident, $variant:ident, $ty:ty) => {
        pub fn $fn(&self) -> Option<&$ty> {
            match self.bodies.get(&MessageType::$variant) {
                Some(Body::$variant(m)) => Some(m),
                _ => None,
            }
        }
    };
}

impl<'a> PulledMessages<'a> {
    pulled!(client_hello, ClientHello, ClientHello);
    pulled!(hello_verify_request, HelloVerifyRequest, HelloVerifyRequest);
    pulled!(server_hello, ServerHello, ServerHello);
    pulled!(certificate, Certificate, Certificate<'a>);
    pulled!(certificate_request, CertificateRequest, CertificateRequest<'a>);
    pulled!(certificate_verify, CertificateVerify, CertificateVerify<'a>);
    pulled!(finished, Finished, Finished<'a>);

    /// The ServerKeyExchange, read as PSK hint or ECDH parameters per `psk`.
    pub fn server_key_exchange(
        &self,
        psk: bool,
    ) -> Result<Option<ServerKeyExchange<'a>>, Error> {
        let Some(body) = self.raw.get(&MessageType::ServerKeyExchange) else {
            return Ok(None);
        };
        let parse = |i: &'a [u8]| ServerKeyExchange::parse_as(i, psk);
        let (_, message) = all_consuming(parse)(*body)?;
        Ok(Some(message))
    }

    /// The ClientKeyExchange, read as PSK identity or ECDH point per `psk`.
    pub fn client_key_exchange(
        &self,
        psk: bool,
    ) -> Result<Option<ClientKeyExchange<'a>>, Error> {
        let Some(body) = self.raw.get(&MessageType::ClientKeyExchange) else {
            return Ok(None);
        };
        let parse = |i: &'a [u8]| ClientKeyExchange::parse_as(i, psk);
        let (_, message) = all_consuming(parse)(*body)?;
        Ok(Some(message))
    }

    pub fn contains(&self, typ: MessageType) -> bool {
        self.bodies.contains_key(&typ)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
