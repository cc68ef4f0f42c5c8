//! AES-128-ECB over single blocks.
//!
//! The codec only ever needs a fixed pseudo-random permutation over one
//! 16-octet block, so this is the raw block cipher, not a mode of operation.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};

use crate::error::QlbError;

/// One AES block, in octets.
pub const BLOCK_LEN: usize = 16;

/// Build the AES-128 key schedule from a 16-byte key.
///
/// # Errors
/// Returns `QlbError::CryptoInitFailure` if the key has the wrong length.
pub fn new_cipher(key: &[u8]) -> Result<Aes128, QlbError> {
    Aes128::new_from_slice(key).map_err(|_| QlbError::CryptoInitFailure)
}

/// Encrypt one block in place.
pub fn encrypt_block_in_place(cipher: &Aes128, buf: &mut [u8; BLOCK_LEN]) {
    let mut block = Block::from(*buf);
    cipher.encrypt_block(&mut block);
    buf.copy_from_slice(&block);
}

/// Decrypt one block in place.
pub fn decrypt_block_in_place(cipher: &Aes128, buf: &mut [u8; BLOCK_LEN]) {
    let mut block = Block::from(*buf);
    cipher.decrypt_block(&mut block);
    buf.copy_from_slice(&block);
}
