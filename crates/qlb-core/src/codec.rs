//! CID generation and server-ID recovery.
//!
//! Buffer layouts by method (octet indices from 0):
//!   * Clear:  [0] first octet | [1..1+sid) server ID | rest for server use
//!   * Stream: [0] first octet | [1..1+nonce) nonce | [..+sid) masked server
//!     ID | rest for server use
//!   * Block:  [0] first octet | [1..17) one AES block (server ID at the low
//!     end) | rest for server use, unencrypted
//!
//! The first octet is host-visible metadata: rotation bits always, the CID
//! length optionally. It is never encrypted and never inspected during
//! recovery.

use aes::Aes128;

use crate::cid::{ConnectionId, ServerId};
use crate::config::{CidMethod, LbConfig};
use crate::crypto::ecb;
use crate::error::QlbError;

/// Sentinel returned by [`CidCodec::verify`] when an observed CID cannot
/// carry a server ID under the current configuration.
pub const SERVER_ID_UNKNOWN: u64 = u64::MAX;

/// The two operations a host needs from a CID scheme: fill in an outgoing
/// CID, and recover the server ID from an observed one.
///
/// A host holds one implementation at a time; see
/// [`QuicHost`](crate::host::QuicHost).
pub trait CidCodec: Send + Sync {
    /// Rewrite `cid` in place.
    ///
    /// The buffer arrives pre-filled with the caller's nonce and
    /// for-server-use octets and must already have the configured CID
    /// length. `cid_local` and `cid_remote` identify the connection for
    /// schemes that want them; this codec ignores both.
    fn generate(&self, cid_local: &ConnectionId, cid_remote: &ConnectionId, cid: &mut ConnectionId);

    /// Recover the embedded server ID, or [`SERVER_ID_UNKNOWN`] if the CID
    /// does not match the configured format. Never fails.
    fn verify(&self, cid: &ConnectionId) -> u64;
}

/// Method-specific live state. Only the block cipher ever decrypts; the
/// stream cipher uses AES solely as a keystream source.
enum CipherState {
    Clear,
    Stream { nonce_length: usize, cipher: Aes128 },
    Block { cipher: Aes128 },
}

/// Installed codec state: the shared first-octet parameters plus the cipher
/// state for the configured method. Immutable once built; share via `Arc`
/// for concurrent generate/verify callers.
pub struct LbCidContext {
    rotation_bits: u8,
    first_byte_encodes_length: bool,
    cid_length: u8,
    server_id: ServerId,
    state: CipherState,
}

impl LbCidContext {
    /// Build a context from a parsed configuration and a concrete CID
    /// length. An inherited (zero) `config.cid_length` must already be
    /// resolved by the caller.
    ///
    /// # Errors
    /// `InconsistentLengths` if the resolved length invariants do not hold,
    /// `CryptoInitFailure` if the AES key schedule cannot be built.
    pub fn new(config: &LbConfig, cid_length: u8) -> Result<Self, QlbError> {
        config.check_lengths(cid_length)?;
        let state = match &config.method {
            CidMethod::Clear => CipherState::Clear,
            CidMethod::StreamCipher { nonce_length, key } => CipherState::Stream {
                nonce_length: usize::from(*nonce_length),
                cipher: ecb::new_cipher(key)?,
            },
            CidMethod::BlockCipher { key } => CipherState::Block {
                cipher: ecb::new_cipher(key)?,
            },
        };
        Ok(Self {
            rotation_bits: config.rotation_bits,
            first_byte_encodes_length: config.first_byte_encodes_length,
            cid_length,
            server_id: config.server_id,
            state,
        })
    }

    /// The CID length this context generates and recognises.
    #[must_use]
    pub fn cid_length(&self) -> u8 {
        self.cid_length
    }

    #[must_use]
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Rotation bits always land in the top two bits; the low six either
    /// encode `cid_length - 1` or keep what the caller put there.
    fn write_first_octet(&self, cid: &mut [u8]) {
        if self.first_byte_encodes_length {
            cid[0] = (self.rotation_bits << 6) | (self.cid_length - 1);
        } else {
            cid[0] = (self.rotation_bits << 6) | (cid[0] & 0x3f);
        }
    }
}

impl CidCodec for LbCidContext {
    fn generate(
        &self,
        _cid_local: &ConnectionId,
        _cid_remote: &ConnectionId,
        cid: &mut ConnectionId,
    ) {
        debug_assert_eq!(cid.len(), usize::from(self.cid_length));
        let sid_length = self.server_id.len();
        let buf = cid.as_mut_slice();
        self.write_first_octet(buf);
        match &self.state {
            CipherState::Clear => {
                buf[1..1 + sid_length].copy_from_slice(self.server_id.as_bytes());
            }
            CipherState::Stream {
                nonce_length,
                cipher,
            } => {
                let id_offset = 1 + nonce_length;
                buf[id_offset..id_offset + sid_length].copy_from_slice(self.server_id.as_bytes());
                stream_cipher_passes(cipher, *nonce_length, sid_length, buf);
            }
            CipherState::Block { cipher } => {
                buf[1..1 + sid_length].copy_from_slice(self.server_id.as_bytes());
                let mut block = [0u8; ecb::BLOCK_LEN];
                block.copy_from_slice(&buf[1..1 + ecb::BLOCK_LEN]);
                ecb::encrypt_block_in_place(cipher, &mut block);
                buf[1..1 + ecb::BLOCK_LEN].copy_from_slice(&block);
            }
        }
    }

    fn verify(&self, cid: &ConnectionId) -> u64 {
        if cid.len() != usize::from(self.cid_length) {
            return SERVER_ID_UNKNOWN;
        }
        let sid_length = self.server_id.len();
        match &self.state {
            CipherState::Clear => decode_server_id(&cid.as_slice()[1..1 + sid_length]),
            CipherState::Stream {
                nonce_length,
                cipher,
            } => {
                // The three masking passes are their own inverse; run them
                // over a scratch copy and read the plaintext server ID.
                let mut scratch = *cid;
                stream_cipher_passes(cipher, *nonce_length, sid_length, scratch.as_mut_slice());
                let id_offset = 1 + nonce_length;
                decode_server_id(&scratch.as_slice()[id_offset..id_offset + sid_length])
            }
            CipherState::Block { cipher } => {
                let mut block = [0u8; ecb::BLOCK_LEN];
                block.copy_from_slice(&cid.as_slice()[1..1 + ecb::BLOCK_LEN]);
                ecb::decrypt_block_in_place(cipher, &mut block);
                decode_server_id(&block[..sid_length])
            }
        }
    }
}

/// One masking pass: zero-pad the seed region to a block, AES-encrypt it,
/// XOR the result into the target region.
fn one_pass_mask(cipher: &Aes128, seed: &[u8], target: &mut [u8]) {
    let mut block = [0u8; ecb::BLOCK_LEN];
    block[..seed.len()].copy_from_slice(seed);
    ecb::encrypt_block_in_place(cipher, &mut block);
    for (t, m) in target.iter_mut().zip(block.iter()) {
        *t ^= m;
    }
}

/// The Feistel-like construction over nonce and server-ID regions:
/// mask the ID under the nonce, the nonce under the masked ID, then the
/// ID again under the masked nonce. Applying it twice restores the input.
fn stream_cipher_passes(cipher: &Aes128, nonce_length: usize, sid_length: usize, cid: &mut [u8]) {
    let (nonce, rest) = cid[1..].split_at_mut(nonce_length);
    let sid = &mut rest[..sid_length];
    one_pass_mask(cipher, nonce, sid);
    one_pass_mask(cipher, sid, nonce);
    one_pass_mask(cipher, nonce, sid);
}

/// Big-endian reassembly: `sum of byte[i] * 256^(len-1-i)`.
fn decode_server_id(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |id, b| (id << 8) | u64::from(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f";

    fn context(txt: &str) -> LbCidContext {
        let config: LbConfig = txt.parse().unwrap();
        LbCidContext::new(&config, config.cid_length).unwrap()
    }

    fn generate(ctx: &LbCidContext, prefill: &[u8]) -> ConnectionId {
        let mut cid = ConnectionId::from_slice(prefill).unwrap();
        let none = ConnectionId::zeroed(0);
        ctx.generate(&none, &none, &mut cid);
        cid
    }

    #[test]
    fn clear_method_writes_id_after_first_octet() {
        let ctx = context("0N5C-2a");
        let cid = generate(&ctx, &[0xc0, 0, 0, 0, 0]);
        assert_eq!(cid.as_slice(), &[0x00, 0x2a, 0x00, 0x00, 0x00]);
        assert_eq!(ctx.verify(&cid), 0x2a);
    }

    #[test]
    fn first_octet_keeps_caller_bits_without_length_encoding() {
        let ctx = context("2N5C-2a");
        let cid = generate(&ctx, &[0xff, 0, 0, 0, 0]);
        // Top two bits replaced by the rotation value, low six preserved.
        assert_eq!(cid.as_slice()[0], (2 << 6) | 0x3f);
    }

    #[test]
    fn first_octet_encodes_length_when_configured() {
        let ctx = context("1Y5C-07");
        let cid = generate(&ctx, &[0xff, 0xff, 0, 0, 0]);
        assert_eq!(cid.as_slice()[0], (1 << 6) | (5 - 1));
        assert_eq!(cid.as_slice()[1], 0x07);
        assert_eq!(ctx.verify(&cid), 7);
    }

    #[test]
    fn generation_is_idempotent_for_fixed_prefill() {
        let key_cfg = format!("1Y20S12-1234-{KEY_HEX}");
        let ctx = context(&key_cfg);
        let mut prefill = [0u8; 20];
        for (i, b) in prefill.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(
            generate(&ctx, &prefill).as_slice(),
            generate(&ctx, &prefill).as_slice()
        );
    }

    #[test]
    fn stream_masking_is_self_inverse() {
        let cipher = ecb::new_cipher(&[7u8; 16]).unwrap();
        let mut buf = *b"x0123456789abcdef-ID";
        let original = buf;
        stream_cipher_passes(&cipher, 16, 3, &mut buf);
        assert_ne!(buf, original);
        stream_cipher_passes(&cipher, 16, 3, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn verify_rejects_length_mismatch_only() {
        let ctx = context("0N10C-2a");
        let cid = generate(&ctx, &[0u8; 10]);
        assert_eq!(ctx.verify(&cid), 0x2a);
        assert_eq!(ctx.verify(&ConnectionId::zeroed(9)), SERVER_ID_UNKNOWN);
        assert_eq!(ctx.verify(&ConnectionId::zeroed(11)), SERVER_ID_UNKNOWN);
    }

    #[test]
    fn decode_is_big_endian() {
        assert_eq!(decode_server_id(&[0x01]), 1);
        assert_eq!(decode_server_id(&[0x01, 0x00]), 256);
        assert_eq!(decode_server_id(&[0xde, 0xad, 0xbe, 0xef]), 0xdead_beef);
    }

    #[test]
    fn rejects_invalid_resolved_length() {
        let config: LbConfig = "0NC-2a".parse().unwrap();
        let err = LbCidContext::new(&config, 0).err().unwrap();
        assert_eq!(err, QlbError::InconsistentLengths);
    }
}
