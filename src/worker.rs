//! Per-connection worker.
//!
//! A worker serves exactly one session: an optional handshake followed by
//! one vector batch. It owns its hash instance and framing reader; the
//! connection is borrowed for the duration of `run`.

use crate::error::WorkerResult;
use crate::protocols::auth::{Authenticator, Credential, HashAlgorithm};
use crate::protocols::vector::{self, BatchSummary, ElementType};
use crate::runtime::{Channel, FrameReader, ReadStrategy};
use serde::Deserialize;
use sha2::digest::DynDigest;
use tracing::{debug, info};

/// Which role the worker plays in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Authenticate the peer before computing.
    #[default]
    Server,
    /// Trust the peer and go straight to computing.
    Client,
}

/// Everything a worker needs besides the connection.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub side: Side,
    pub element_type: ElementType,
    pub hash: HashAlgorithm,
    pub read_strategy: ReadStrategy,
    pub buffer_size: usize,
    pub credential: Credential,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            side: Side::default(),
            element_type: ElementType::default(),
            hash: HashAlgorithm::default(),
            read_strategy: ReadStrategy::default(),
            buffer_size: 1024,
            credential: Credential::default(),
        }
    }
}

pub struct Worker {
    settings: WorkerSettings,
    hasher: Box<dyn DynDigest + Send>,
    reader: Box<dyn FrameReader>,
}

impl Worker {
    pub fn new(settings: WorkerSettings) -> Self {
        debug!(
            side = ?settings.side,
            element_type = %settings.element_type,
            hash = ?settings.hash,
            read_strategy = %settings.read_strategy,
            "worker created"
        );
        let hasher = settings.hash.hasher();
        let reader = settings.read_strategy.reader(settings.buffer_size);
        Self {
            settings,
            hasher,
            reader,
        }
    }

    /// Serve one session on `channel`.
    ///
    /// The connection is left open; closing it is up to the caller.
    pub fn run(&mut self, channel: &mut dyn Channel) -> WorkerResult<BatchSummary> {
        if self.settings.side == Side::Server {
            let mut auth = Authenticator::new(
                &self.settings.credential,
                self.hasher.as_mut(),
                self.reader.as_mut(),
            );
            auth.run(channel)?;
            info!(username = %self.settings.credential.username, "peer authenticated");
        }

        vector::process(self.settings.element_type, channel)
    }
}
