// Container Module - On-Disk Layout of an Encrypted File
// =======================================================
// An encrypted file is a fixed 40-byte header followed by the ciphertext:
//
//   offset  size  field
//   0       8     signature
//   8       15    salt (key-derivation salt for this file)
//   23      16    iv (initial chaining value)
//   39      1     final block length (0 = last block fully meaningful)
//   40      N*16  ciphertext blocks
//
// The format carries no integrity tag: a flipped ciphertext bit decrypts to
// garbage without being detected.

use rand::{rngs::OsRng, RngCore};
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{CryptError, IoContext, Result};

/// Format marker at the start of every container
pub const SIGNATURE: [u8; SIGNATURE_SIZE] = *b"CHNVAULT";
pub const SIGNATURE_SIZE: usize = 8;
pub const SALT_SIZE: usize = 15;
pub const IV_SIZE: usize = 16;
/// AES block size is always 16 bytes
pub const BLOCK_SIZE: usize = 16;
pub const HEADER_SIZE: usize = SIGNATURE_SIZE + SALT_SIZE + IV_SIZE + 1;

/// Suffix appended to encrypted files
pub const SUFFIX: &str = ".cvlt";

/// Per-file metadata stored in front of the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub salt: [u8; SALT_SIZE],
    pub iv: [u8; IV_SIZE],
    pub final_block_len: u8,
}

impl Header {
    /// Fresh random salt and IV for a file about to be encrypted.
    pub fn generate(final_block_len: u8) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        Self {
            salt,
            iv,
            final_block_len,
        }
    }

    /// Number of plaintext bytes a container with this header and
    /// `block_count` blocks decrypts to.
    pub fn plaintext_len(&self, block_count: u64) -> u64 {
        match (block_count, self.final_block_len) {
            (0, _) => 0,
            (n, 0) => n * BLOCK_SIZE as u64,
            (n, len) => (n - 1) * BLOCK_SIZE as u64 + len as u64,
        }
    }
}

/// Read and validate the header of a container
///
/// The reader must be positioned at the start of the file. On success the
/// reader is left at the first ciphertext block and the number of blocks
/// is returned alongside the header.
///
/// Parameters:
/// - reader: Source positioned at offset 0
/// - file_size: Total size of the container in bytes
/// - path: Used only to label errors
pub fn parse_header<R: Read>(reader: &mut R, file_size: u64, path: &Path) -> Result<(Header, u64)> {
    if file_size < HEADER_SIZE as u64 {
        return Err(CryptError::format(
            path,
            format!("file is {file_size} bytes, shorter than the {HEADER_SIZE}-byte header"),
        ));
    }

    let mut signature = [0u8; SIGNATURE_SIZE];
    read_field(reader, &mut signature, path)?;
    if signature != SIGNATURE {
        return Err(CryptError::format(path, "bad signature"));
    }

    let mut salt = [0u8; SALT_SIZE];
    read_field(reader, &mut salt, path)?;
    let mut iv = [0u8; IV_SIZE];
    read_field(reader, &mut iv, path)?;
    let mut final_block_len = [0u8; 1];
    read_field(reader, &mut final_block_len, path)?;
    let final_block_len = final_block_len[0];

    if final_block_len as usize > BLOCK_SIZE {
        return Err(CryptError::format(
            path,
            format!("final block length {final_block_len} exceeds the block size"),
        ));
    }

    let body = file_size - HEADER_SIZE as u64;
    if body % BLOCK_SIZE as u64 != 0 {
        return Err(CryptError::format(
            path,
            format!("{body} ciphertext bytes are not a multiple of {BLOCK_SIZE}"),
        ));
    }
    let block_count = body / BLOCK_SIZE as u64;

    // Zero blocks only encode an empty plaintext
    if block_count == 0 && final_block_len != 0 {
        return Err(CryptError::format(path, "no ciphertext blocks"));
    }

    Ok((
        Header {
            salt,
            iv,
            final_block_len,
        },
        block_count,
    ))
}

/// Write the 40-byte header; ciphertext blocks follow sequentially.
pub fn write_header<W: Write>(writer: &mut W, header: &Header, path: &Path) -> Result<()> {
    writer.write_all(&SIGNATURE).with_path(path)?;
    writer.write_all(&header.salt).with_path(path)?;
    writer.write_all(&header.iv).with_path(path)?;
    writer.write_all(&[header.final_block_len]).with_path(path)?;
    Ok(())
}

// A short read inside the header means the file was truncated underneath us
fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CryptError::format(path, "truncated header"),
        _ => CryptError::io(path, e),
    })
}

/// Meaningful bytes in the last block for a plaintext of `len` bytes
/// (0 when the last block is full).
pub fn final_block_len_for(len: u64) -> u8 {
    (len % BLOCK_SIZE as u64) as u8
}

/// Number of ciphertext blocks for a plaintext of `len` bytes.
pub fn block_count_for(len: u64) -> u64 {
    len.div_ceil(BLOCK_SIZE as u64)
}

/// Whether the file name ends with the container suffix.
///
/// Compared on the raw encoded bytes, so names that are not valid UTF-8
/// are classified the same way `decrypted_path` strips them.
pub fn has_suffix(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.as_encoded_bytes().ends_with(SUFFIX.as_bytes()))
        .unwrap_or(false)
}

/// `notes.txt` -> `notes.txt.cvlt`
pub fn encrypted_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(SUFFIX);
    PathBuf::from(name)
}

/// `notes.txt.cvlt` -> `notes.txt`; `None` if the suffix is missing or
/// nothing would remain of the file name.
pub fn decrypted_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.as_encoded_bytes();
    let stem = name.strip_suffix(SUFFIX.as_bytes())?;
    if stem.is_empty() {
        return None;
    }
    // SAFETY: `stem` is `name` cut immediately before the ASCII suffix, and
    // splitting encoded bytes right before valid UTF-8 keeps them valid.
    let stem = unsafe { OsStr::from_encoded_bytes_unchecked(stem) };
    Some(path.with_file_name(stem))
}
