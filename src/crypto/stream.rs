//! AEAD-framed stream wrapper.
//!
//! # Wire format (each direction independently)
//! ```text
//! [salt: key_len bytes]
//! [seal(len: u16 BE)][seal(payload: len bytes)]   ← repeated
//! ```
//!
//! Reads buffer raw ciphertext until a whole sealed unit is available, then
//! hand out plaintext. Writes seal up to `MAX_PAYLOAD` bytes per call and
//! queue the ciphertext; the queue is drained before new data is accepted.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::cipher::{CipherError, ChunkOpener, ChunkSealer, MasterKey, MAX_PAYLOAD, TAG_LEN};

const READ_CHUNK: usize = 16 * 1024;

/// A byte stream whose payload is AEAD-sealed in both directions.
pub struct CipherStream<S> {
    inner: S,
    key: MasterKey,
    decoder: Decoder,
    sealer: ChunkSealer,
    /// Ciphertext accepted from callers but not yet written to `inner`.
    outgoing: BytesMut,
    scratch: Box<[u8]>,
}

struct Decoder {
    opener: Option<ChunkOpener>,
    raw: BytesMut,
    pending_len: Option<usize>,
    plain: BytesMut,
    eof: bool,
}

impl<S> CipherStream<S> {
    /// Wrap `inner`. A fresh random salt is queued ahead of the first chunk.
    pub fn new(inner: S, key: MasterKey) -> Result<Self, CipherError> {
        let mut salt = vec![0u8; key.kind().salt_len()];
        rand::thread_rng().fill_bytes(&mut salt);
        let sealer = ChunkSealer::new(&key, &salt)?;

        Ok(Self {
            inner,
            key,
            decoder: Decoder {
                opener: None,
                raw: BytesMut::with_capacity(READ_CHUNK),
                pending_len: None,
                plain: BytesMut::new(),
                eof: false,
            },
            sealer,
            outgoing: BytesMut::from(&salt[..]),
            scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
        })
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl Decoder {
    /// Open the next complete chunk in `raw`. Returns `false` when more
    /// ciphertext is needed.
    fn decode_chunk(&mut self, key: &MasterKey) -> io::Result<bool> {
        if self.opener.is_none() {
            let salt_len = key.kind().salt_len();
            if self.raw.len() < salt_len {
                return Ok(false);
            }
            let salt = self.raw.split_to(salt_len);
            self.opener = Some(ChunkOpener::new(key, &salt).map_err(invalid_data)?);
        }
        let Some(opener) = self.opener.as_mut() else {
            return Ok(false);
        };

        let len = match self.pending_len {
            Some(len) => len,
            None => {
                if self.raw.len() < 2 + TAG_LEN {
                    return Ok(false);
                }
                let sealed = self.raw.split_to(2 + TAG_LEN);
                let len = opener.open_len(&sealed).map_err(invalid_data)?;
                self.pending_len = Some(len);
                len
            }
        };

        if self.raw.len() < len + TAG_LEN {
            return Ok(false);
        }
        let sealed = self.raw.split_to(len + TAG_LEN);
        let payload = opener.open_payload(&sealed).map_err(invalid_data)?;
        self.pending_len = None;
        self.plain.extend_from_slice(&payload);
        Ok(true)
    }

    fn mid_frame(&self) -> bool {
        !self.raw.is_empty() || self.pending_len.is_some()
    }
}

impl<S> CipherStream<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.outgoing.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.outgoing))?;
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "inner stream accepted no ciphertext",
                )));
            }
            self.outgoing.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S> AsyncRead for CipherStream<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.decoder.plain.is_empty() {
                let n = buf.remaining().min(this.decoder.plain.len());
                buf.put_slice(&this.decoder.plain[..n]);
                this.decoder.plain.advance(n);
                return Poll::Ready(Ok(()));
            }

            if this.decoder.decode_chunk(&this.key)? {
                continue;
            }

            if this.decoder.eof {
                if this.decoder.mid_frame() {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside a sealed chunk",
                    )));
                }
                return Poll::Ready(Ok(()));
            }

            let mut read_buf = ReadBuf::new(&mut this.scratch);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read_buf))?;
            let filled = read_buf.filled();
            if filled.is_empty() {
                this.decoder.eof = true;
            } else {
                this.decoder.raw.extend_from_slice(filled);
            }
        }
    }
}

impl<S> AsyncWrite for CipherStream<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let n = buf.len().min(MAX_PAYLOAD);
        this.sealer
            .seal_chunk(&buf[..n], &mut this.outgoing)
            .map_err(io::Error::other)?;

        // The bytes are accepted; a pending drain finishes on the next call.
        if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

fn invalid_data(err: CipherError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
