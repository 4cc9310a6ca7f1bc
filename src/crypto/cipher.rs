//! AEAD method selection, key derivation and chunk sealing.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use bytes::{BufMut, BytesMut};
use chacha20poly1305::ChaCha20Poly1305;
use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;
use thiserror::Error;

/// Authentication tag appended by every seal.
pub const TAG_LEN: usize = 16;

/// Nonce width shared by all supported methods.
pub const NONCE_LEN: usize = 12;

/// Largest payload carried by one chunk.
pub const MAX_PAYLOAD: usize = 0x3FFF;

const SUBKEY_INFO: &[u8] = b"ss-subkey";

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("unknown cipher method '{0}'")]
    UnknownMethod(String),

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("seal failed")]
    Seal,

    #[error("chunk failed authentication")]
    Open,

    #[error("chunk length {0} exceeds {MAX_PAYLOAD}")]
    OversizedChunk(usize),
}

/// Supported AEAD methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherKind::Aes128Gcm => "AEAD_AES_128_GCM",
            CipherKind::Aes256Gcm => "AEAD_AES_256_GCM",
            CipherKind::ChaCha20Poly1305 => "AEAD_CHACHA20_POLY1305",
        }
    }

    /// Name used by client configuration documents.
    pub fn client_name(&self) -> &'static str {
        match self {
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
            CipherKind::ChaCha20Poly1305 => "chacha20-ietf-poly1305",
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes256Gcm | CipherKind::ChaCha20Poly1305 => 32,
        }
    }

    /// Salt length equals key length for every method.
    pub fn salt_len(&self) -> usize {
        self.key_len()
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherKind {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "AEAD_AES_128_GCM" | "AES_128_GCM" => Ok(CipherKind::Aes128Gcm),
            "AEAD_AES_256_GCM" | "AES_256_GCM" => Ok(CipherKind::Aes256Gcm),
            "AEAD_CHACHA20_POLY1305" | "CHACHA20_IETF_POLY1305" => {
                Ok(CipherKind::ChaCha20Poly1305)
            }
            _ => Err(CipherError::UnknownMethod(s.to_string())),
        }
    }
}

/// Per-user master key, derived once from the credential.
#[derive(Clone)]
pub struct MasterKey {
    kind: CipherKind,
    bytes: Vec<u8>,
}

impl MasterKey {
    /// OpenSSL `EVP_BytesToKey` with MD5 and no salt, as every Shadowsocks
    /// client derives it from the password.
    pub fn derive(kind: CipherKind, credential: &str) -> Self {
        Self {
            kind,
            bytes: evp_bytes_to_key(credential.as_bytes(), kind.key_len()),
        }
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    fn subkey(&self, salt: &[u8]) -> Result<Vec<u8>, CipherError> {
        let hk = Hkdf::<Sha1>::new(Some(salt), &self.bytes);
        let mut okm = vec![0u8; self.kind.key_len()];
        hk.expand(SUBKEY_INFO, &mut okm)
            .map_err(|_| CipherError::KeyDerivation)?;
        Ok(okm)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// `D_i = MD5(D_{i-1} || password)`, concatenated until `key_len` bytes.
fn evp_bytes_to_key(password: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut block: Vec<u8> = Vec::new();
    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&block);
        hasher.update(password);
        block = hasher.finalize().to_vec();
        key.extend_from_slice(&block);
    }
    key.truncate(key_len);
    key
}

enum AeadCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
    ChaCha(ChaCha20Poly1305),
}

impl AeadCipher {
    fn new(kind: CipherKind, key: &[u8]) -> Result<Self, CipherError> {
        let cipher = match kind {
            CipherKind::Aes128Gcm => Aes128Gcm::new_from_slice(key).map(AeadCipher::Aes128),
            CipherKind::Aes256Gcm => Aes256Gcm::new_from_slice(key).map(AeadCipher::Aes256),
            CipherKind::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new_from_slice(key).map(AeadCipher::ChaCha)
            }
        };
        cipher.map_err(|_| CipherError::KeyDerivation)
    }

    fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = GenericArray::from_slice(nonce);
        let sealed = match self {
            AeadCipher::Aes128(c) => c.encrypt(nonce, plaintext),
            AeadCipher::Aes256(c) => c.encrypt(nonce, plaintext),
            AeadCipher::ChaCha(c) => c.encrypt(nonce, plaintext),
        };
        sealed.map_err(|_| CipherError::Seal)
    }

    fn open(&self, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = GenericArray::from_slice(nonce);
        let opened = match self {
            AeadCipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            AeadCipher::Aes256(c) => c.decrypt(nonce, ciphertext),
            AeadCipher::ChaCha(c) => c.decrypt(nonce, ciphertext),
        };
        opened.map_err(|_| CipherError::Open)
    }
}

/// Little-endian counter nonce, bumped after every seal or open.
struct NonceCounter([u8; NONCE_LEN]);

impl NonceCounter {
    fn new() -> Self {
        Self([0u8; NONCE_LEN])
    }

    fn next(&mut self) -> [u8; NONCE_LEN] {
        let current = self.0;
        for byte in self.0.iter_mut() {
            let (value, carry) = byte.overflowing_add(1);
            *byte = value;
            if !carry {
                break;
            }
        }
        current
    }
}

/// Sealing half of one direction.
pub struct ChunkSealer {
    cipher: AeadCipher,
    nonce: NonceCounter,
}

impl ChunkSealer {
    pub fn new(key: &MasterKey, salt: &[u8]) -> Result<Self, CipherError> {
        let subkey = key.subkey(salt)?;
        Ok(Self {
            cipher: AeadCipher::new(key.kind, &subkey)?,
            nonce: NonceCounter::new(),
        })
    }

    /// Append `[seal(len)][seal(payload)]` to `out`.
    pub fn seal_chunk(&mut self, payload: &[u8], out: &mut BytesMut) -> Result<(), CipherError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(CipherError::OversizedChunk(payload.len()));
        }
        let len = (payload.len() as u16).to_be_bytes();
        let sealed_len = self.cipher.seal(&self.nonce.next(), &len)?;
        let sealed_payload = self.cipher.seal(&self.nonce.next(), payload)?;

        out.reserve(sealed_len.len() + sealed_payload.len());
        out.put_slice(&sealed_len);
        out.put_slice(&sealed_payload);
        Ok(())
    }
}

/// Opening half of one direction.
pub struct ChunkOpener {
    cipher: AeadCipher,
    nonce: NonceCounter,
}

impl ChunkOpener {
    pub fn new(key: &MasterKey, salt: &[u8]) -> Result<Self, CipherError> {
        let subkey = key.subkey(salt)?;
        Ok(Self {
            cipher: AeadCipher::new(key.kind, &subkey)?,
            nonce: NonceCounter::new(),
        })
    }

    /// Open a sealed 2-byte length header.
    pub fn open_len(&mut self, sealed: &[u8]) -> Result<usize, CipherError> {
        let plain = self.cipher.open(&self.nonce.next(), sealed)?;
        let len = match plain.as_slice() {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as usize,
            _ => return Err(CipherError::Open),
        };
        if len > MAX_PAYLOAD {
            return Err(CipherError::OversizedChunk(len));
        }
        Ok(len)
    }

    pub fn open_payload(&mut self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.cipher.open(&self.nonce.next(), sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(
            "AEAD_AES_256_GCM".parse::<CipherKind>().unwrap(),
            CipherKind::Aes256Gcm
        );
        assert_eq!(
            "aead_aes_128_gcm".parse::<CipherKind>().unwrap(),
            CipherKind::Aes128Gcm
        );
        assert_eq!(
            "chacha20-ietf-poly1305".parse::<CipherKind>().unwrap(),
            CipherKind::ChaCha20Poly1305
        );
        assert!(matches!(
            "rc4-md5".parse::<CipherKind>(),
            Err(CipherError::UnknownMethod(_))
        ));
    }

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_master_key_matches_evp_bytes_to_key() {
        let key = MasterKey::derive(CipherKind::Aes256Gcm, "password");
        assert_eq!(
            key.bytes,
            unhex("5f4dcc3b5aa765d61d8327deb882cf992b95990a9151374abd8ff8c5a7a0fe08")
        );
        let key = MasterKey::derive(CipherKind::Aes128Gcm, "password");
        assert_eq!(key.bytes, unhex("5f4dcc3b5aa765d61d8327deb882cf99"));
    }

    #[test]
    fn test_subkey_is_hkdf_sha1() {
        let key = MasterKey::derive(CipherKind::Aes256Gcm, "password");
        assert_eq!(
            key.subkey(&[0x11; 32]).unwrap(),
            unhex("5ad4676de88ef3579e0daeff0f07b389f710b6bf4f2910485ec384d446ed3600")
        );
    }

    /// Frames sealed by a standard client: password "password", salt of
    /// 0x11 bytes, then `seal([0, 5]) || seal("hello")`.
    #[test]
    fn test_interoperates_with_standard_clients() {
        let vectors = [
            (
                CipherKind::Aes128Gcm,
                "0ea90311f2f05e31efd0e931f675a396935538eead2a5dd6298a7fcfbd1d763b715857c96575a9",
            ),
            (
                CipherKind::Aes256Gcm,
                "06b4be7b1f8bbfc2398b06c287bd95ddd2e48b698312407ccc6e513d89362a117db80dc338ede3",
            ),
            (
                CipherKind::ChaCha20Poly1305,
                "07d9efc25251ef5253486bbe4decb3909e36d77244fcec448ead7773bb7995b3cc49fbc58e87f4",
            ),
        ];

        for (kind, frame) in vectors {
            let frame = unhex(frame);
            let key = MasterKey::derive(kind, "password");
            let salt = vec![0x11; kind.salt_len()];

            let mut opener = ChunkOpener::new(&key, &salt).unwrap();
            assert_eq!(opener.open_len(&frame[..2 + TAG_LEN]).unwrap(), 5);
            assert_eq!(opener.open_payload(&frame[2 + TAG_LEN..]).unwrap(), b"hello");

            let mut sealer = ChunkSealer::new(&key, &salt).unwrap();
            let mut out = BytesMut::new();
            sealer.seal_chunk(b"hello", &mut out).unwrap();
            assert_eq!(&out[..], &frame[..], "{}", kind);
        }
    }

    #[test]
    fn test_master_key_length_follows_method() {
        assert_eq!(MasterKey::derive(CipherKind::Aes128Gcm, "pw").bytes.len(), 16);
        assert_eq!(MasterKey::derive(CipherKind::Aes256Gcm, "pw").bytes.len(), 32);
    }

    #[test]
    fn test_nonce_counter_is_little_endian() {
        let mut counter = NonceCounter::new();
        assert_eq!(counter.next()[0], 0);
        assert_eq!(counter.next()[0], 1);

        counter.0[0] = 0xFF;
        let before = counter.next();
        assert_eq!(before[0], 0xFF);
        assert_eq!(counter.0[0], 0);
        assert_eq!(counter.0[1], 1);
    }

    #[test]
    fn test_chunk_opens_with_matching_salt() {
        for kind in [
            CipherKind::Aes128Gcm,
            CipherKind::Aes256Gcm,
            CipherKind::ChaCha20Poly1305,
        ] {
            let key = MasterKey::derive(kind, "secret");
            let salt = vec![7u8; kind.salt_len()];
            let mut sealer = ChunkSealer::new(&key, &salt).unwrap();
            let mut opener = ChunkOpener::new(&key, &salt).unwrap();

            let mut out = BytesMut::new();
            sealer.seal_chunk(b"hello", &mut out).unwrap();
            assert_eq!(out.len(), 2 + TAG_LEN + 5 + TAG_LEN);

            let len = opener.open_len(&out[..2 + TAG_LEN]).unwrap();
            assert_eq!(len, 5);
            let payload = opener.open_payload(&out[2 + TAG_LEN..]).unwrap();
            assert_eq!(payload, b"hello");
        }
    }

    #[test]
    fn test_tampered_chunk_fails() {
        let key = MasterKey::derive(CipherKind::Aes256Gcm, "secret");
        let salt = [1u8; 32];
        let mut sealer = ChunkSealer::new(&key, &salt).unwrap();
        let mut opener = ChunkOpener::new(&key, &salt).unwrap();

        let mut out = BytesMut::new();
        sealer.seal_chunk(b"payload", &mut out).unwrap();
        out[0] ^= 0x01;
        assert!(matches!(opener.open_len(&out[..2 + TAG_LEN]), Err(CipherError::Open)));
    }

    #[test]
    fn test_different_salt_fails() {
        let key = MasterKey::derive(CipherKind::ChaCha20Poly1305, "secret");
        let mut sealer = ChunkSealer::new(&key, &[1u8; 32]).unwrap();
        let mut opener = ChunkOpener::new(&key, &[2u8; 32]).unwrap();

        let mut out = BytesMut::new();
        sealer.seal_chunk(b"payload", &mut out).unwrap();
        assert!(opener.open_len(&out[..2 + TAG_LEN]).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let key = MasterKey::derive(CipherKind::Aes128Gcm, "secret");
        let mut sealer = ChunkSealer::new(&key, &[0u8; 16]).unwrap();
        let mut out = BytesMut::new();
        let big = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            sealer.seal_chunk(&big, &mut out),
            Err(CipherError::OversizedChunk(_))
        ));
    }
}
