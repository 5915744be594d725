use super::{finished_packets, server_finished_rules, Flight, INITIAL_EPOCH};
use crate::cache::{HandshakeCache, PullRule};
use crate::conn::Packet;
use crate::crypto::prf::verify_data_server;
use crate::message::MessageType;
use crate::state::State;
use crate::Error;

/// ChangeCipherSpec and the server Finished.
pub(super) fn generate(state: &mut State, cache: &mut HandshakeCache) -> Result<Vec<Packet>, Error> {
    if state.local_verify_data.is_empty() {
        let hash = state
            .cipher_suite
            .hash_algorithm()
            .ok_or(Error::InvalidCipherSuite)?;
        let transcript = cache.pull_and_merge(&server_finished_rules());
        state.local_verify_data = verify_data_server(&state.master_secret, &transcript, hash)?;
    }

    Ok(finished_packets(state, cache))
}

/// The client resends its Finished when ours got lost. Answering it means
/// staying in flight 6.
pub(super) fn parse(state: &mut State, cache: &HandshakeCache) -> Result<Option<Flight>, Error> {
    let rule = [PullRule::new(
        MessageType::Finished,
        INITIAL_EPOCH + 1,
        true,
        false,
    )];
    let start = state.handshake_recv_sequence.wrapping_sub(1);
    if cache.full_pull_map(start, &rule).is_none() {
        return Ok(None);
    }

    Ok(Some(Flight::Flight6))
}
