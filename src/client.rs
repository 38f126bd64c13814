//! Peer side of the protocol.
//!
//! Used by the `send` subcommand and by tests to drive a worker the way a
//! remote client would.

use crate::error::{AuthFailure, WorkerError, WorkerResult};
use crate::protocols::auth::challenge::{challenge_digest, ACK, SALT_HEX_LEN};
use crate::protocols::auth::{Credential, HashAlgorithm};
use crate::protocols::vector::Element;
use crate::runtime::{recv_exact, Channel};
use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

pub struct Client {
    credential: Credential,
    hash: HashAlgorithm,
}

impl Client {
    pub fn new(credential: Credential, hash: HashAlgorithm) -> Self {
        Self { credential, hash }
    }

    /// Prove knowledge of the password to a server-side worker.
    ///
    /// Each text message goes out in a single write so that every framing
    /// strategy on the other end sees it whole.
    pub fn authenticate(&self, channel: &mut dyn Channel) -> WorkerResult<()> {
        let hello = format!("{}\n", self.credential.username);
        channel
            .write_all(hello.as_bytes())
            .map_err(|e| WorkerError::connection("send username", e))?;

        let mut salt = [0u8; SALT_HEX_LEN];
        recv_exact(channel, &mut salt).map_err(|e| WorkerError::connection("recv salt", e))?;
        let salt = String::from_utf8_lossy(&salt);
        debug!(salt = %salt, "received salt");

        let mut hasher = self.hash.hasher();
        let digest = challenge_digest(hasher.as_mut(), &salt, &self.credential.password);
        channel
            .write_all(format!("{digest}\n").as_bytes())
            .map_err(|e| WorkerError::connection("send digest", e))?;

        let mut ack = [0u8; 2];
        recv_exact(channel, &mut ack).map_err(|e| WorkerError::connection("recv OK", e))?;
        if &ack != ACK {
            return Err(WorkerError::Auth(AuthFailure::Refused));
        }
        debug!("authenticated");
        Ok(())
    }

    /// Submit one batch and collect a sum per vector.
    pub fn submit_batch<E: Element>(
        &self,
        channel: &mut dyn Channel,
        vectors: &[Vec<E>],
    ) -> WorkerResult<Vec<E>> {
        let mut out = BytesMut::new();
        out.put_u32_le(wire_len(vectors.len())?);
        channel
            .write_all(&out)
            .map_err(|e| WorkerError::connection("send number of vectors", e))?;

        let mut sums = Vec::with_capacity(vectors.len());
        let mut reply = vec![0u8; E::SIZE];
        for (index, vector) in vectors.iter().enumerate() {
            out.clear();
            out.reserve(4 + vector.len() * E::SIZE);
            out.put_u32_le(wire_len(vector.len())?);
            for &x in vector {
                x.encode(&mut out);
            }
            channel
                .write_all(&out)
                .map_err(|e| WorkerError::connection("send vector", e))?;

            recv_exact(channel, &mut reply).map_err(|e| WorkerError::connection("recv sum", e))?;
            let sum = E::decode(&reply);
            trace!(index, len = vector.len(), %sum, "received sum");
            sums.push(sum);
        }
        Ok(sums)
    }
}

fn wire_len(len: usize) -> WorkerResult<u32> {
    u32::try_from(len).map_err(|_| WorkerError::Vector(format!("length {len} exceeds u32")))
}
