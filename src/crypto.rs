// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! AES-based encryption transformers: [`CtrCrypt`] (sequential-write-only
//! counter mode) and [`RandCrypt`] (CBC mode with a random IV prefix).
//!
//! Neither wrapper keeps a process-global key: the [`AesKey`] is supplied
//! once, at construction, and threaded through from there.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use rand::{CryptoRng, RngCore};

use crate::error::{Result, WoramError};
use crate::memory::{Address, Memory};
use crate::split::{chunk_split, OffsetMem};

/// The width, in bytes, of one AES block (128 bits), regardless of key size.
pub(crate) const CRYPTBLOCK: usize = 16;

/// An AES key, supplied explicitly at construction time rather than read
/// from a global.
#[derive(Clone)]
pub enum AesKey {
    /// A 128-bit key.
    Key128([u8; 16]),
    /// A 256-bit key.
    Key256([u8; 32]),
}

pub(crate) enum AesCipher {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl AesCipher {
    pub(crate) fn new(key: &AesKey) -> Self {
        match key {
            AesKey::Key128(k) => AesCipher::Aes128(Box::new(Aes128::new(GenericArray::from_slice(k)))),
            AesKey::Key256(k) => AesCipher::Aes256(Box::new(Aes256::new(GenericArray::from_slice(k)))),
        }
    }

    fn encrypt_block(&self, block: &mut [u8; CRYPTBLOCK]) {
        let ga = GenericArray::from_mut_slice(block);
        match self {
            AesCipher::Aes128(c) => c.encrypt_block(ga),
            AesCipher::Aes256(c) => c.encrypt_block(ga),
        }
    }

    fn decrypt_block(&self, block: &mut [u8; CRYPTBLOCK]) {
        let ga = GenericArray::from_mut_slice(block);
        match self {
            AesCipher::Aes128(c) => c.decrypt_block(ga),
            AesCipher::Aes256(c) => c.decrypt_block(ga),
        }
    }
}

/// A standalone AES-CBC encrypt/decrypt pair, keyed once at construction.
/// Factored out of [`RandCrypt`] so that [`crate::woram::bmno`] can apply
/// the same per-block cipher to primary-area ciphertext whose IV is kept
/// out-of-band in a metadata record, rather than inline in the block.
pub(crate) struct CbcCodec {
    cipher: AesCipher,
}

impl CbcCodec {
    pub(crate) fn new(key: &AesKey) -> Self {
        Self {
            cipher: AesCipher::new(key),
        }
    }

    pub(crate) fn encrypt(&self, iv: &[u8; CRYPTBLOCK], plain: &[u8], out: &mut [u8]) {
        let mut prev = *iv;
        for start in (0..plain.len()).step_by(CRYPTBLOCK) {
            let mut block = [0u8; CRYPTBLOCK];
            for j in 0..CRYPTBLOCK {
                block[j] = plain[start + j] ^ prev[j];
            }
            self.cipher.encrypt_block(&mut block);
            out[start..start + CRYPTBLOCK].copy_from_slice(&block);
            prev = block;
        }
    }

    pub(crate) fn decrypt(&self, iv: &[u8; CRYPTBLOCK], ctext: &[u8], out: &mut [u8]) {
        let mut prev = *iv;
        for start in (0..ctext.len()).step_by(CRYPTBLOCK) {
            let mut ctext_block = [0u8; CRYPTBLOCK];
            ctext_block.copy_from_slice(&ctext[start..start + CRYPTBLOCK]);
            let mut block = ctext_block;
            self.cipher.decrypt_block(&mut block);
            for j in 0..CRYPTBLOCK {
                block[j] ^= prev[j];
            }
            out[start..start + CRYPTBLOCK].copy_from_slice(&block);
            prev = ctext_block;
        }
    }
}

/// Wraps a backend in AES counter-mode encryption. The counter for block
/// `index` in round `round` is the 128-bit value `(round + index, 0)`,
/// incremented in its low 64 bits once per 16-byte sub-block; a full pass
/// over `size()` sequential stores advances to the next round. **The
/// backend must be written sequentially, starting from index 0** — this is
/// what lets `load` recover which round last wrote a given index without
/// storing that metadata anywhere.
pub struct CtrCrypt<M> {
    backend: M,
    cipher: AesCipher,
    round: usize,
    nextpos: usize,
}

impl<M: Memory> CtrCrypt<M> {
    /// Wraps `backend`, whose blocksize must be a multiple of 16 bytes,
    /// starting the counter at round `startround`.
    pub fn new(backend: M, key: AesKey, startround: usize) -> Self {
        assert!(
            backend.blocksize() % CRYPTBLOCK == 0,
            "CtrCrypt blocksize must be a multiple of {CRYPTBLOCK}"
        );
        Self {
            backend,
            cipher: AesCipher::new(&key),
            round: startround,
            nextpos: 0,
        }
    }

    fn crypt(&self, ctr: usize, input: &[u8], output: &mut [u8]) {
        let n = input.len() / CRYPTBLOCK;
        let ctr_hi = (ctr as u64).to_ne_bytes();
        for i in 0..n {
            let mut pad = [0u8; CRYPTBLOCK];
            pad[..8].copy_from_slice(&ctr_hi);
            pad[8..].copy_from_slice(&(i as u64).to_ne_bytes());
            self.cipher.encrypt_block(&mut pad);
            let start = i * CRYPTBLOCK;
            for j in 0..CRYPTBLOCK {
                output[start + j] = input[start + j] ^ pad[j];
            }
        }
    }
}

impl<M: Memory> Memory for CtrCrypt<M> {
    fn blocksize(&self) -> usize {
        self.backend.blocksize()
    }

    fn size(&self) -> usize {
        self.backend.size()
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        let mut ctext = vec![0u8; self.blocksize()];
        self.backend.load(index, &mut ctext)?;
        let mut ctr = self.round.wrapping_add(index);
        if index >= self.nextpos {
            ctr = ctr.wrapping_sub(self.size());
        }
        self.crypt(ctr, &ctext, out);
        Ok(())
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        if index != self.nextpos {
            return Err(WoramError::InvalidAccess {
                index,
                expected: self.nextpos,
            });
        }
        let ctr = self.round.wrapping_add(index);
        let mut ctext = vec![0u8; self.blocksize()];
        self.crypt(ctr, data, &mut ctext);
        self.backend.store(index, &ctext)?;
        self.nextpos += 1;
        if self.nextpos == self.size() {
            self.nextpos = 0;
            self.round = self.round.wrapping_add(self.size());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.backend.flush()
    }

    fn good(&self) -> bool {
        self.backend.good()
    }
}

/// Wraps a backend in AES-CBC encryption with a random IV prefixed to every
/// block. Unlike [`CtrCrypt`], writes may happen in any order: the IV
/// travels with the ciphertext, so no shared counter state is needed.
/// `blocksize()` is 16 bytes smaller than the backend's, to make room for
/// the IV.
pub struct RandCrypt<M, R> {
    backend: M,
    cipher: CbcCodec,
    rng: R,
}

impl<M: Memory, R: RngCore + CryptoRng> RandCrypt<M, R> {
    /// Wraps `backend`, whose blocksize must exceed 16 bytes by a multiple
    /// of 16, drawing IVs from `rng`.
    pub fn new(backend: M, key: AesKey, rng: R) -> Self {
        assert!(
            backend.blocksize() > CRYPTBLOCK,
            "RandCrypt backend blocksize must leave room for a {CRYPTBLOCK}-byte IV"
        );
        assert!(
            (backend.blocksize() - CRYPTBLOCK) % CRYPTBLOCK == 0,
            "RandCrypt plaintext blocksize must be a multiple of {CRYPTBLOCK}"
        );
        Self {
            backend,
            cipher: CbcCodec::new(&key),
            rng,
        }
    }
}

impl<M: Memory, R: RngCore + CryptoRng> Memory for RandCrypt<M, R> {
    fn blocksize(&self) -> usize {
        self.backend.blocksize() - CRYPTBLOCK
    }

    fn size(&self) -> usize {
        self.backend.size()
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        let mut raw = vec![0u8; self.backend.blocksize()];
        self.backend.load(index, &mut raw)?;
        let mut iv = [0u8; CRYPTBLOCK];
        iv.copy_from_slice(&raw[..CRYPTBLOCK]);
        self.cipher.decrypt(&iv, &raw[CRYPTBLOCK..], out);
        Ok(())
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        let mut iv = [0u8; CRYPTBLOCK];
        self.rng.fill_bytes(&mut iv);
        let mut raw = vec![0u8; self.backend.blocksize()];
        raw[..CRYPTBLOCK].copy_from_slice(&iv);
        self.cipher.encrypt(&iv, data, &mut raw[CRYPTBLOCK..]);
        self.backend.store(index, &raw)
    }

    fn flush(&mut self) -> Result<()> {
        self.backend.flush()
    }

    fn good(&self) -> bool {
        self.backend.good()
    }
}

/// Splits `backend` into `x` and `y` blocks and wraps each half in its own
/// [`CtrCrypt`], using disjoint counter rounds (`0` and `usize::MAX / 2`) so
/// the two halves' keystreams never collide even though they share a key.
pub fn ctr_crypt_split<M: Memory>(
    backend: M,
    x: usize,
    y: usize,
    key: AesKey,
) -> (CtrCrypt<OffsetMem<M>>, CtrCrypt<OffsetMem<M>>) {
    let (m0, m1) = chunk_split(backend, x, y);
    let c0 = CtrCrypt::new(m0, key.clone(), 0);
    let c1 = CtrCrypt::new(m1, key, usize::MAX / 2);
    (c0, c1)
}

/// Splits `backend` into `x` and `y` blocks, encrypting only the first
/// half with [`RandCrypt`] and leaving the second untouched.
pub fn rand_crypt_split<M: Memory, R: RngCore + CryptoRng>(
    backend: M,
    x: usize,
    y: usize,
    key: AesKey,
    rng: R,
) -> (RandCrypt<OffsetMem<M>, R>, OffsetMem<M>) {
    let (m0, m1) = chunk_split(backend, x, y);
    let c0 = RandCrypt::new(m0, key, rng);
    (c0, m1)
}
