//! The slice of a QUIC host instance that CID generation plugs into.
//!
//! The real transport stack owns connections, sockets and handshakes; the
//! codec only needs three things from it: the local CID length, whether any
//! connections are live, and a slot holding the one installed
//! [`CidCodec`]. `QuicHost` models exactly that, so the codec's install and
//! teardown rules can be exercised without a transport.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::cid::{ConnectionId, MAX_CONNECTION_ID_LEN};
use crate::codec::{CidCodec, LbCidContext, SERVER_ID_UNKNOWN};
use crate::config::LbConfig;
use crate::error::QlbError;

pub struct QuicHost {
    local_cid_length: u8,
    active_connections: usize,
    cid_codec: Option<Arc<dyn CidCodec>>,
}

impl QuicHost {
    /// A host with no codec installed. Lengths above the QUIC maximum are
    /// capped at 20.
    #[must_use]
    pub fn new(local_cid_length: u8) -> Self {
        Self {
            local_cid_length: local_cid_length.min(MAX_CONNECTION_ID_LEN as u8),
            active_connections: 0,
            cid_codec: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn local_cid_length(&self) -> u8 {
        self.local_cid_length
    }

    #[inline]
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections
    }

    /// The installed codec, if any. Clone the `Arc` to run generate/verify
    /// from other threads.
    #[must_use]
    pub fn cid_codec(&self) -> Option<&Arc<dyn CidCodec>> {
        self.cid_codec.as_ref()
    }

    pub fn connection_opened(&mut self) {
        self.active_connections += 1;
    }

    pub fn connection_closed(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }

    /// Validate `config`, build the codec context and publish it on this
    /// host, adopting the configured CID length. A zero `config.cid_length`
    /// inherits the host's current length.
    ///
    /// # Errors
    /// * `IncompatibleHostState` -- live connections exist under a different
    ///   CID length, or a codec is already installed.
    /// * `InconsistentLengths` -- the resolved length invariants fail.
    /// * `CryptoInitFailure` -- AES key setup failed.
    ///
    /// On error nothing is published; partially built state is dropped.
    pub fn install_lb_codec(&mut self, config: &LbConfig) -> Result<(), QlbError> {
        let cid_length = if config.cid_length == 0 {
            self.local_cid_length
        } else {
            config.cid_length
        };
        if self.active_connections > 0 && self.local_cid_length != cid_length {
            return Err(QlbError::IncompatibleHostState);
        }
        if self.cid_codec.is_some() {
            return Err(QlbError::IncompatibleHostState);
        }
        let ctx = LbCidContext::new(config, cid_length)?;
        self.local_cid_length = cid_length;
        self.cid_codec = Some(Arc::new(ctx));
        Ok(())
    }

    /// Remove the installed codec, if any. Dropping the context releases its
    /// AES state; in-flight readers holding `Arc` clones finish unharmed.
    pub fn uninstall_lb_codec(&mut self) {
        self.cid_codec = None;
    }

    /// Mint a local CID: a buffer of the host's CID length pre-filled with
    /// random nonce / for-server-use octets, then rewritten by the installed
    /// codec. Without a codec the random buffer is returned as-is.
    #[must_use]
    pub fn mint_cid(&self, cid_local: &ConnectionId, cid_remote: &ConnectionId) -> ConnectionId {
        let mut cid = ConnectionId::zeroed(usize::from(self.local_cid_length));
        OsRng.fill_bytes(cid.as_mut_slice());
        if let Some(codec) = &self.cid_codec {
            codec.generate(cid_local, cid_remote, &mut cid);
        }
        cid
    }

    /// Recover the server ID from an observed CID via the installed codec;
    /// [`SERVER_ID_UNKNOWN`] when no codec is installed.
    #[must_use]
    pub fn verify_cid(&self, cid: &ConnectionId) -> u64 {
        match &self.cid_codec {
            Some(codec) => codec.verify(cid),
            None => SERVER_ID_UNKNOWN,
        }
    }
}
