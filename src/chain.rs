// Chain Module - Hand-Chained AES-256-CBC
// =======================================================
// The cipher itself only ever sees one 16-byte block at a time. Chaining is
// done here: each block is XORed with a feedback value, which is the IV for
// the first block and the previous ciphertext block afterwards.
//
// Decryption: P_i = D(K, C_i) ^ F_i,  F_{i+1} = C_i
// Encryption: C_i = E(K, P_i ^ F_i),  F_{i+1} = C_i
//
// The last block may carry fewer meaningful bytes than 16. On encryption it
// is zero-extended; on decryption the trailing bytes are dropped without any
// padding check.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::container::{Header, BLOCK_SIZE, IV_SIZE};
use crate::error::{CryptError, IoContext, Result};

pub type Block = [u8; BLOCK_SIZE];

/// AES-256 keyed for single-block operations in both directions.
pub struct BlockCipher {
    cipher: Aes256,
}

impl BlockCipher {
    /// Fails with `CryptError::Key` unless `key` is exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256::new_from_slice(key).map_err(|_| CryptError::Key { len: key.len() })?;
        Ok(Self { cipher })
    }

    /// Decrypt one block and fold in the feedback value.
    pub fn decrypt_block(&self, feedback: &Block, input: &[u8]) -> Result<Block> {
        let mut block = one_block(input)?;
        self.cipher
            .decrypt_block(GenericArray::from_mut_slice(&mut block));
        xor_in_place(&mut block, feedback);
        Ok(block)
    }

    /// Fold in the feedback value and encrypt one block.
    pub fn encrypt_block(&self, feedback: &Block, input: &[u8]) -> Result<Block> {
        let mut block = one_block(input)?;
        xor_in_place(&mut block, feedback);
        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(&mut block));
        Ok(block)
    }
}

fn one_block(input: &[u8]) -> Result<Block> {
    input
        .try_into()
        .map_err(|_| CryptError::BlockSize { len: input.len() })
}

fn xor_in_place(block: &mut Block, other: &Block) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}

/// Decrypts a sequence of blocks, carrying the feedback between calls.
pub struct ChainDecryptor<'a> {
    cipher: &'a BlockCipher,
    feedback: Block,
}

impl<'a> ChainDecryptor<'a> {
    pub fn new(cipher: &'a BlockCipher, iv: [u8; IV_SIZE]) -> Self {
        Self {
            cipher,
            feedback: iv,
        }
    }

    pub fn next_block(&mut self, ciphertext: &[u8]) -> Result<Block> {
        let plaintext = self.cipher.decrypt_block(&self.feedback, ciphertext)?;
        // Feedback for the next block is the ciphertext just consumed
        self.feedback.copy_from_slice(ciphertext);
        Ok(plaintext)
    }
}

/// Encrypts a sequence of blocks, carrying the feedback between calls.
pub struct ChainEncryptor<'a> {
    cipher: &'a BlockCipher,
    feedback: Block,
}

impl<'a> ChainEncryptor<'a> {
    pub fn new(cipher: &'a BlockCipher, iv: [u8; IV_SIZE]) -> Self {
        Self {
            cipher,
            feedback: iv,
        }
    }

    pub fn next_block(&mut self, plaintext: &[u8]) -> Result<Block> {
        let ciphertext = self.cipher.encrypt_block(&self.feedback, plaintext)?;
        self.feedback = ciphertext;
        Ok(ciphertext)
    }
}

/// Decrypt `block_count` blocks from `reader` into `writer`
///
/// The reader must be positioned just after the container header. Only the
/// first `header.final_block_len` bytes of the last block are written when
/// that value is nonzero.
///
/// Parameters:
/// - reader/src: Ciphertext source and its path (for error messages)
/// - writer/dst: Plaintext sink and its path
/// - cipher: Keyed with the key derived from this container's salt
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_stream<R: Read, W: Write>(
    reader: R,
    writer: W,
    cipher: &BlockCipher,
    header: &Header,
    block_count: u64,
    src: &Path,
    dst: &Path,
) -> Result<u64> {
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut chain = ChainDecryptor::new(cipher, header.iv);
    let mut input = [0u8; BLOCK_SIZE];
    let mut written = 0u64;

    for i in 0..block_count {
        // Read the next ciphertext block and undo the chaining
        reader.read_exact(&mut input).with_path(src)?;
        let plaintext = chain.next_block(&input)?;

        // Only the last block may be partially meaningful
        let keep = if i + 1 == block_count && header.final_block_len != 0 {
            header.final_block_len as usize
        } else {
            BLOCK_SIZE
        };
        writer.write_all(&plaintext[..keep]).with_path(dst)?;
        written += keep as u64;
    }

    // Flush the writer to ensure all data is written
    writer.flush().with_path(dst)?;
    Ok(written)
}

/// Encrypt exactly `plaintext_len` bytes from `reader` into `writer`
///
/// The header is expected to be written already. The final partial block,
/// if any, is zero-extended before encryption.
///
/// Returns the number of ciphertext blocks written.
pub fn encrypt_stream<R: Read, W: Write>(
    reader: R,
    writer: W,
    cipher: &BlockCipher,
    iv: [u8; IV_SIZE],
    plaintext_len: u64,
    src: &Path,
    dst: &Path,
) -> Result<u64> {
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut chain = ChainEncryptor::new(cipher, iv);
    let mut remaining = plaintext_len;
    let mut blocks = 0u64;

    while remaining > 0 {
        // A short final read leaves the rest of the block zeroed
        let take = remaining.min(BLOCK_SIZE as u64) as usize;
        let mut input = [0u8; BLOCK_SIZE];
        reader.read_exact(&mut input[..take]).with_path(src)?;

        // Encrypt against the previous ciphertext and write it out
        let ciphertext = chain.next_block(&input)?;
        writer.write_all(&ciphertext).with_path(dst)?;
        remaining -= take as u64;
        blocks += 1;
    }

    writer.flush().with_path(dst)?;
    Ok(blocks)
}
