//! Load balancer configuration: the ASCII descriptor grammar, its canonical
//! form, and the length invariants.
//!
//! Descriptor layout, in order, no whitespace:
//!   * rotation bits, one of '0'..'3'
//!   * 'Y'/'N': whether the first CID octet also encodes the CID length
//!   * optional decimal CID length (empty = 0 = inherit from the host)
//!   * method letter: 'C' clear, 'S' stream cipher (followed by the decimal
//!     nonce length), 'B' block cipher
//!   * '-' then the server ID as 2..16 hex nibbles
//!   * for 'S' and 'B': '-' then the AES-128 key as exactly 32 hex nibbles
//!
//! Example: `0Y10S8-31-0123456789abcdeffedcba9876543210`

use core::fmt;
use core::str::FromStr;

use zeroize::Zeroize;

use crate::cid::{ServerId, MAX_CONNECTION_ID_LEN};
use crate::error::QlbError;

/// How the server ID is embedded in a CID.
///
/// Each variant carries only the parameters its method needs.
#[derive(Clone, PartialEq, Eq)]
pub enum CidMethod {
    /// Server ID copied verbatim after the first octet.
    Clear,
    /// Server ID XOR-masked under a keystream derived from a per-CID nonce.
    StreamCipher { nonce_length: u8, key: [u8; 16] },
    /// The 16 octets after the first byte AES-encrypted as a single block.
    BlockCipher { key: [u8; 16] },
}

impl CidMethod {
    /// Nonce length in octets; zero for methods without a nonce.
    #[must_use]
    pub fn nonce_length(&self) -> u8 {
        match self {
            CidMethod::StreamCipher { nonce_length, .. } => *nonce_length,
            CidMethod::Clear | CidMethod::BlockCipher { .. } => 0,
        }
    }
}

// Keys stay out of Debug output.
impl fmt::Debug for CidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CidMethod::Clear => f.write_str("Clear"),
            CidMethod::StreamCipher { nonce_length, .. } => f
                .debug_struct("StreamCipher")
                .field("nonce_length", nonce_length)
                .finish_non_exhaustive(),
            CidMethod::BlockCipher { .. } => {
                f.debug_struct("BlockCipher").finish_non_exhaustive()
            }
        }
    }
}

/// A parsed load balancer configuration.
///
/// Produced by the [`FromStr`] parser; [`fmt::Display`] emits the canonical
/// descriptor, which re-parses to an equal value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LbConfig {
    /// Value written into the top two bits of the first CID octet.
    pub rotation_bits: u8,
    /// When set, the low six bits of the first octet carry `cid_length - 1`.
    pub first_byte_encodes_length: bool,
    /// Total CID length in octets; 0 means "inherit the host's length".
    pub cid_length: u8,
    /// Encoding scheme plus its method-specific parameters.
    pub method: CidMethod,
    /// Identifier embedded in every generated CID.
    pub server_id: ServerId,
}

impl Drop for LbConfig {
    fn drop(&mut self) {
        match &mut self.method {
            CidMethod::StreamCipher { key, .. } | CidMethod::BlockCipher { key } => {
                key.zeroize();
            }
            CidMethod::Clear => {}
        }
    }
}

impl LbConfig {
    /// Enforce the draft's length invariants against a concrete CID length.
    ///
    /// Callers resolve an inherited (zero) `cid_length` before calling.
    ///
    /// # Errors
    /// `QlbError::InconsistentLengths` on any violation.
    pub fn check_lengths(&self, cid_length: u8) -> Result<(), QlbError> {
        let cid_length = usize::from(cid_length);
        let sid_length = self.server_id.len();
        if cid_length == 0 || cid_length > MAX_CONNECTION_ID_LEN {
            return Err(QlbError::InconsistentLengths);
        }
        match &self.method {
            CidMethod::Clear => {
                if cid_length < 1 + sid_length {
                    return Err(QlbError::InconsistentLengths);
                }
            }
            CidMethod::StreamCipher { nonce_length, .. } => {
                let nonce_length = usize::from(*nonce_length);
                if !(8..=16).contains(&nonce_length)
                    || cid_length < 1 + nonce_length + sid_length
                {
                    return Err(QlbError::InconsistentLengths);
                }
            }
            CidMethod::BlockCipher { .. } => {
                if cid_length < 17 || sid_length > 15 {
                    return Err(QlbError::InconsistentLengths);
                }
            }
        }
        Ok(())
    }
}

/// Consume a run of ASCII digits as a length field. Values reaching 256
/// are a grammar error; an empty run is zero.
fn parse_decimal(bytes: &[u8], pos: &mut usize) -> Result<u8, QlbError> {
    let mut value: u32 = 0;
    while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
        value = value * 10 + u32::from(bytes[*pos] - b'0');
        if value > 255 {
            return Err(QlbError::MalformedConfig);
        }
        *pos += 1;
    }
    Ok(value as u8)
}

fn expect_hyphen(bytes: &[u8], pos: &mut usize) -> Result<(), QlbError> {
    if *pos < bytes.len() && bytes[*pos] == b'-' {
        *pos += 1;
        Ok(())
    } else {
        Err(QlbError::MalformedConfig)
    }
}

impl FromStr for LbConfig {
    type Err = QlbError;

    fn from_str(txt: &str) -> Result<Self, QlbError> {
        let bytes = txt.as_bytes();
        if bytes.len() < 4 {
            return Err(QlbError::MalformedConfig);
        }

        let rotation_bits = match bytes[0] {
            b'0'..=b'3' => bytes[0] - b'0',
            _ => return Err(QlbError::MalformedConfig),
        };
        let first_byte_encodes_length = match bytes[1] {
            b'Y' | b'y' => true,
            b'N' | b'n' => false,
            _ => return Err(QlbError::MalformedConfig),
        };

        let mut pos = 2;
        let cid_length = parse_decimal(bytes, &mut pos)?;

        if pos >= bytes.len() {
            return Err(QlbError::MalformedConfig);
        }
        let method_letter = bytes[pos];
        pos += 1;
        let nonce_length = match method_letter {
            b's' | b'S' => parse_decimal(bytes, &mut pos)?,
            b'c' | b'C' | b'b' | b'B' => 0,
            _ => return Err(QlbError::MalformedConfig),
        };

        expect_hyphen(bytes, &mut pos)?;

        let sid_end = bytes[pos..]
            .iter()
            .position(|&c| c == b'-')
            .map_or(bytes.len(), |i| pos + i);
        let sid_bytes = hex::decode(&txt[pos..sid_end]).map_err(|_| QlbError::MalformedConfig)?;
        let server_id = ServerId::from_bytes(&sid_bytes).ok_or(QlbError::MalformedConfig)?;
        pos = sid_end;

        let method = match method_letter {
            b'c' | b'C' => CidMethod::Clear,
            _ => {
                expect_hyphen(bytes, &mut pos)?;
                let key_hex = &txt[pos..];
                if key_hex.len() != 32 {
                    return Err(QlbError::MalformedConfig);
                }
                let key: [u8; 16] = hex::decode(key_hex)
                    .map_err(|_| QlbError::MalformedConfig)?
                    .try_into()
                    .map_err(|_| QlbError::MalformedConfig)?;
                pos = bytes.len();
                match method_letter {
                    b's' | b'S' => CidMethod::StreamCipher { nonce_length, key },
                    _ => CidMethod::BlockCipher { key },
                }
            }
        };

        if pos != bytes.len() {
            return Err(QlbError::MalformedConfig);
        }

        let config = LbConfig {
            rotation_bits,
            first_byte_encodes_length,
            cid_length,
            method,
            server_id,
        };

        if config.cid_length != 0 {
            config
                .check_lengths(config.cid_length)
                .map_err(|_| QlbError::MalformedConfig)?;
        } else if let CidMethod::StreamCipher { nonce_length, .. } = &config.method {
            // Nonce range is method-intrinsic, checked even when the CID
            // length is inherited.
            if !(8..=16).contains(nonce_length) {
                return Err(QlbError::MalformedConfig);
            }
        }

        Ok(config)
    }
}

impl fmt::Display for LbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.rotation_bits,
            if self.first_byte_encodes_length { 'Y' } else { 'N' }
        )?;
        if self.cid_length != 0 {
            write!(f, "{}", self.cid_length)?;
        }
        match &self.method {
            CidMethod::Clear => {
                write!(f, "C-{}", hex::encode(self.server_id.as_bytes()))
            }
            CidMethod::StreamCipher { nonce_length, key } => write!(
                f,
                "S{}-{}-{}",
                nonce_length,
                hex::encode(self.server_id.as_bytes()),
                hex::encode(key)
            ),
            CidMethod::BlockCipher { key } => write!(
                f,
                "B-{}-{}",
                hex::encode(self.server_id.as_bytes()),
                hex::encode(key)
            ),
        }
    }
}
