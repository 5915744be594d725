//! Flight based DTLS 1.2 handshake.
//!
//! A handshake is a sequence of flights, each a group of messages sent
//! together and retransmitted together:
//!
//! ```text
//!  Client                                      Server
//!  ------                                      ------
//!  ClientHello               --> Flight 1
//!                            <-- Flight 2      HelloVerifyRequest
//!  ClientHello (cookie)      --> Flight 3
//!                                              ServerHello
//!                                              Certificate*
//!                                              ServerKeyExchange*
//!                                              CertificateRequest*
//!                            <-- Flight 4      ServerHelloDone
//!  Certificate*
//!  ClientKeyExchange
//!  CertificateVerify*
//!  [ChangeCipherSpec]
//!  Finished                  --> Flight 5
//!                                              [ChangeCipherSpec]
//!                            <-- Flight 6      Finished
//! ```
//!
//! [`HandshakeFsm`] drives one side through the flights over anything that
//! implements [`FlightConn`]: the record layer and the datagram transport
//! below it. Loss, duplication and reordering are handled by retransmitting
//! whole flights with an exponential backoff.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
// #![deny(missing_docs)]

#[macro_use]
extern crate log;

#[macro_use]
mod macros;

pub mod alert;
mod cache;
pub mod cipher_suite;
mod config;
mod conn;
mod context;
pub mod crypto;
mod error;
mod flight;
mod fsm;
pub mod message;
pub mod record;
mod rng;
mod state;
mod timer;

#[cfg(test)]
mod test_util;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use cache::{HandshakeCache, PullRule};
pub use cipher_suite::{CipherSuite, CipherSuiteId};
pub use config::{
    ClientAuthType, ExtendedMasterSecretType, GetCertificate, HandshakeConfig,
    HandshakeConfigBuilder, PskCallback, VerifyPeerCertificate,
};
pub use conn::{Content, FlightConn, HandshakeMessage, Packet};
pub use context::{CancelToken, Context};
pub use crypto::{CertificateVerifier, CertifiedKey, NamedCurve, PrivateKey, RootStoreVerifier};
pub use error::Error;
pub use flight::Flight;
pub use fsm::{HandshakeFsm, HandshakeState};
pub use message::extensions::SrtpProtectionProfile;
pub use state::{Epochs, State};
