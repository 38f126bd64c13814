//! Server side of the salted challenge-response handshake.

use crate::error::{AuthFailure, WorkerError, WorkerResult};
use crate::protocols::auth::challenge::{
    challenge_digest, constant_time_eq, generate_salt, Credential, ACK,
};
use crate::runtime::{Channel, FrameReader};
use sha2::digest::DynDigest;
use tracing::debug;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingUsername,
    AwaitingResponse,
    /// Terminal success.
    Authenticated,
    /// Terminal failure.
    Rejected,
}

/// Drives one handshake over a borrowed channel.
pub struct Authenticator<'a> {
    credential: &'a Credential,
    hasher: &'a mut dyn DynDigest,
    reader: &'a mut dyn FrameReader,
    state: AuthState,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        credential: &'a Credential,
        hasher: &'a mut dyn DynDigest,
        reader: &'a mut dyn FrameReader,
    ) -> Self {
        Self {
            credential,
            hasher,
            reader,
            state: AuthState::AwaitingUsername,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Run the handshake to a terminal state.
    ///
    /// Any error leaves the authenticator in `Rejected`; there are no
    /// retries.
    pub fn run(&mut self, channel: &mut dyn Channel) -> WorkerResult<()> {
        let result = self.handshake(channel);
        if let Err(e) = &result {
            debug!(error = %e, "handshake failed");
            self.state = AuthState::Rejected;
        }
        result
    }

    fn handshake(&mut self, channel: &mut dyn Channel) -> WorkerResult<()> {
        let username = self.reader.read_message(channel)?;
        debug!(username = %username, "received username");

        // Nothing derived from the credential leaves this side before the
        // username checks out.
        if !self.credential.matches_username(&username) {
            return Err(WorkerError::Auth(AuthFailure::UnknownUser));
        }

        let salt = generate_salt();
        channel
            .write_all(salt.as_bytes())
            .map_err(|e| WorkerError::connection("send salt", e))?;
        debug!(salt = %salt, "sent salt");

        let expected = challenge_digest(&mut *self.hasher, &salt, &self.credential.password);
        self.state = AuthState::AwaitingResponse;

        let response = self.reader.read_message(channel)?;
        if !constant_time_eq(response.as_bytes(), expected.as_bytes()) {
            return Err(WorkerError::Auth(AuthFailure::PasswordMismatch));
        }

        self.state = AuthState::Authenticated;
        debug!("digest accepted");
        channel
            .write_all(ACK)
            .map_err(|e| WorkerError::connection("send OK", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::auth::challenge::{HashAlgorithm, SALT_HEX_LEN};
    use crate::runtime::{ReadStrategy, WriteLimited};
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::thread::{self, JoinHandle};

    type ServerHandle = JoinHandle<(WorkerResult<()>, AuthState)>;

    /// Run the server side on its own thread, returning the peer's end.
    fn spawn_server(strategy: ReadStrategy) -> (UnixStream, ServerHandle) {
        let (peer, mut local) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let credential = Credential::default();
            let mut hasher = HashAlgorithm::Sha1.hasher();
            let mut reader = strategy.reader(64);
            let mut auth = Authenticator::new(&credential, hasher.as_mut(), reader.as_mut());
            let result = auth.run(&mut local);
            (result, auth.state())
        });
        (peer, handle)
    }

    fn read_salt(peer: &mut UnixStream) -> String {
        let mut salt = [0u8; SALT_HEX_LEN];
        peer.read_exact(&mut salt).unwrap();
        String::from_utf8(salt.to_vec()).unwrap()
    }

    fn digest_for(salt: &str, password: &str) -> String {
        let mut hasher = HashAlgorithm::Sha1.hasher();
        challenge_digest(hasher.as_mut(), salt, password)
    }

    #[test]
    fn test_accepts_correct_digest() {
        for strategy in [
            ReadStrategy::DoublingPeek,
            ReadStrategy::ReadThenDrain,
            ReadStrategy::SingleShot,
        ] {
            let (mut peer, server) = spawn_server(strategy);
            peer.write_all(b"user\n").unwrap();
            let salt = read_salt(&mut peer);
            peer.write_all(format!("{}\n", digest_for(&salt, "P@ssW0rd")).as_bytes())
                .unwrap();

            let mut ack = [0u8; 2];
            peer.read_exact(&mut ack).unwrap();
            assert_eq!(&ack, ACK);

            let (result, state) = server.join().unwrap();
            assert!(result.is_ok(), "{strategy}");
            assert_eq!(state, AuthState::Authenticated);
        }
    }

    #[test]
    fn test_unknown_user_gets_no_salt() {
        let (mut peer, server) = spawn_server(ReadStrategy::DoublingPeek);
        peer.write_all(b"mallory\r\n").unwrap();

        let (result, state) = server.join().unwrap();
        assert!(matches!(
            result,
            Err(WorkerError::Auth(AuthFailure::UnknownUser))
        ));
        assert_eq!(state, AuthState::Rejected);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn test_wrong_password_rejected() {
        let (mut peer, server) = spawn_server(ReadStrategy::ReadThenDrain);
        peer.write_all(b"user\n").unwrap();
        let salt = read_salt(&mut peer);
        peer.write_all(format!("{}\n", digest_for(&salt, "guess")).as_bytes())
            .unwrap();

        let (result, state) = server.join().unwrap();
        assert!(matches!(
            result,
            Err(WorkerError::Auth(AuthFailure::PasswordMismatch))
        ));
        assert_eq!(state, AuthState::Rejected);

        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty(), "no acknowledgement after a mismatch");
    }

    #[test]
    fn test_lowercase_digest_rejected() {
        let (mut peer, server) = spawn_server(ReadStrategy::DoublingPeek);
        peer.write_all(b"user\n").unwrap();
        let salt = read_salt(&mut peer);
        let digest = digest_for(&salt, "P@ssW0rd").to_ascii_lowercase();
        peer.write_all(format!("{digest}\n").as_bytes()).unwrap();

        let (result, _) = server.join().unwrap();
        assert!(matches!(
            result,
            Err(WorkerError::Auth(AuthFailure::PasswordMismatch))
        ));
    }

    #[test]
    fn test_replayed_digest_rejected() {
        let (mut peer, server) = spawn_server(ReadStrategy::DoublingPeek);
        peer.write_all(b"user\n").unwrap();
        let salt = read_salt(&mut peer);
        let captured = digest_for(&salt, "P@ssW0rd");
        peer.write_all(format!("{captured}\n").as_bytes()).unwrap();
        let (result, _) = server.join().unwrap();
        assert!(result.is_ok());

        let (mut peer, server) = spawn_server(ReadStrategy::DoublingPeek);
        peer.write_all(b"user\n").unwrap();
        let fresh_salt = read_salt(&mut peer);
        assert_ne!(fresh_salt, salt);
        peer.write_all(format!("{captured}\n").as_bytes()).unwrap();

        let (result, state) = server.join().unwrap();
        assert!(matches!(
            result,
            Err(WorkerError::Auth(AuthFailure::PasswordMismatch))
        ));
        assert_eq!(state, AuthState::Rejected);
    }

    #[test]
    fn test_salt_send_failure_is_connection_error() {
        let (mut peer, local) = UnixStream::pair().unwrap();
        peer.write_all(b"user\n").unwrap();
        let mut channel = WriteLimited::new(local, 0);

        let credential = Credential::default();
        let mut hasher = HashAlgorithm::Sha1.hasher();
        let mut reader = ReadStrategy::DoublingPeek.reader(64);
        let mut auth = Authenticator::new(&credential, hasher.as_mut(), reader.as_mut());

        let err = auth.run(&mut channel).unwrap_err();
        assert!(matches!(err, WorkerError::Connection { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
        assert_eq!(auth.state(), AuthState::Rejected);
    }

    #[test]
    fn test_ack_send_failure_is_connection_error() {
        let (mut peer, local) = UnixStream::pair().unwrap();
        let server = thread::spawn(move || {
            let mut channel = WriteLimited::new(local, 1);
            let credential = Credential::default();
            let mut hasher = HashAlgorithm::Sha1.hasher();
            let mut reader = ReadStrategy::ReadThenDrain.reader(64);
            let mut auth = Authenticator::new(&credential, hasher.as_mut(), reader.as_mut());
            let result = auth.run(&mut channel);
            (result, auth.state())
        });

        peer.write_all(b"user\n").unwrap();
        let salt = read_salt(&mut peer);
        peer.write_all(format!("{}\n", digest_for(&salt, "P@ssW0rd")).as_bytes())
            .unwrap();

        let (result, state) = server.join().unwrap();
        let err = result.unwrap_err();
        assert!(matches!(err, WorkerError::Connection { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
        assert_eq!(state, AuthState::Rejected);

        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty(), "no acknowledgement went out");
    }

    #[test]
    fn test_peer_hangup_before_digest() {
        let (mut peer, server) = spawn_server(ReadStrategy::DoublingPeek);
        peer.write_all(b"user\n").unwrap();
        read_salt(&mut peer);
        drop(peer);

        // A closed peer reads as an empty digest.
        let (result, state) = server.join().unwrap();
        assert!(matches!(
            result,
            Err(WorkerError::Auth(AuthFailure::PasswordMismatch))
        ));
        assert_eq!(state, AuthState::Rejected);
    }
}
