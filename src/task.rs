// Task Module - Encrypting or Decrypting One File
// =======================================================
// A file task validates its input, derives the key from the salt that
// belongs to *this* file, runs the block chain and writes the result next to
// the source. Each task works from an immutable `Credentials` snapshot, so
// concurrently running tasks never share a derived key.
//
// A failed task leaves any partially written output in place.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::chain::{self, BlockCipher};
use crate::container::{self, block_count_for, final_block_len_for, Header, SUFFIX};
use crate::error::{CryptError, IoContext, Result};
use crate::kdf::{derive_key, DerivedKey};

/// Which way files are being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

impl Mode {
    /// Encryption takes files without the container suffix, decryption
    /// only files that carry it.
    pub fn is_eligible(self, path: &Path) -> bool {
        match self {
            Mode::Encrypt => !container::has_suffix(path),
            Mode::Decrypt => container::has_suffix(path),
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Mode::Encrypt => "Encryption",
            Mode::Decrypt => "Decryption",
        }
    }
}

/// The caller's password and the ordered list of paths to process.
///
/// Created once per run. File tasks never see this directly; they receive
/// a `Credentials` snapshot instead.
#[derive(Clone)]
pub struct CredentialContext {
    password: Arc<str>,
    targets: Vec<PathBuf>,
}

impl CredentialContext {
    pub fn new(password: impl Into<String>, targets: Vec<PathBuf>) -> Self {
        Self {
            password: Arc::from(password.into()),
            targets,
        }
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            password: Arc::clone(&self.password),
        }
    }
}

impl std::fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialContext")
            .field("password", &"[REDACTED]")
            .field("targets", &self.targets)
            .finish()
    }
}

/// Immutable per-task snapshot of the secret material.
#[derive(Clone)]
pub struct Credentials {
    password: Arc<str>,
}

impl Credentials {
    pub fn new(password: &str) -> Self {
        Self {
            password: Arc::from(password),
        }
    }

    /// Key for the container whose header carries `salt`.
    pub fn key_for(&self, salt: &[u8; container::SALT_SIZE]) -> DerivedKey {
        derive_key(&self.password, salt)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of one file task, sent exactly once to the orchestrator.
#[derive(Debug)]
pub struct Outcome {
    pub source: PathBuf,
    pub result: Result<PathBuf>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run one file task in the given direction
///
/// Never panics and never returns early: every failure ends up in the
/// returned `Outcome`.
pub fn process_file(path: &Path, creds: &Credentials, mode: Mode) -> Outcome {
    debug!(path = %path.display(), mode = ?mode, "file task started");
    let result = match mode {
        Mode::Encrypt => encrypt_file(path, creds),
        Mode::Decrypt => decrypt_file(path, creds),
    };
    match &result {
        Ok(output) => info!(
            source = %path.display(),
            output = %output.display(),
            "{} succeeded",
            mode.verb()
        ),
        Err(err) => error!(source = %path.display(), "{} failed: {err}", mode.verb()),
    }
    Outcome {
        source: path.to_path_buf(),
        result,
    }
}

/// Decrypt a container file
///
/// The process:
/// 1. Open the source and check it carries the container suffix
/// 2. Parse and validate the header
/// 3. Derive the key from the password and this file's salt
/// 4. Create the output (source path minus the suffix), refusing to
///    truncate an output that is itself a container
/// 5. Decrypt every block into the output
///
/// Parameters:
/// - path: Path of the `.cvlt` file
/// - creds: Password snapshot for this task
///
/// Returns the path of the plaintext file.
pub fn decrypt_file(path: &Path, creds: &Credentials) -> Result<PathBuf> {
    // Open the container and work out where the plaintext goes
    let input = File::open(path).with_path(path)?;

    let output_path = container::decrypted_path(path).ok_or_else(|| CryptError::Suffix {
        path: path.to_path_buf(),
        expected: SUFFIX.to_string(),
    })?;

    // Validate the header before anything is written
    let file_size = input.metadata().with_path(path)?.len();
    let mut reader = input;
    let (header, block_count) = container::parse_header(&mut reader, file_size, path)?;

    // The key depends on this file's salt
    let key = creds.key_for(&header.salt);
    let cipher = BlockCipher::new(key.as_bytes())?;

    // `a.cvlt.cvlt` would decrypt onto `a.cvlt`, which may be another task's
    // input at this very moment
    if container::has_suffix(&output_path) && output_path.exists() {
        return Err(CryptError::io(
            &output_path,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "output is itself a container awaiting decryption",
            ),
        ));
    }

    // Decrypt block by block into the output file
    let output = File::create(&output_path).with_path(&output_path)?;
    let written = chain::decrypt_stream(
        reader,
        output,
        &cipher,
        &header,
        block_count,
        path,
        &output_path,
    )?;
    debug_assert_eq!(written, header.plaintext_len(block_count));
    debug!(path = %path.display(), blocks = block_count, bytes = written, "decrypted");

    Ok(output_path)
}

/// Encrypt a plaintext file
///
/// The process:
/// 1. Open the source and check it does not already carry the suffix
/// 2. Generate a fresh salt and IV, derive the key
/// 3. Create the output (source path plus the suffix) and write the header
/// 4. Encrypt the contents block by block, zero-extending the last block
///
/// Returns the path of the container file.
pub fn encrypt_file(path: &Path, creds: &Credentials) -> Result<PathBuf> {
    // Open the source; containers are never encrypted a second time
    let input = File::open(path).with_path(path)?;

    if container::has_suffix(path) {
        return Err(CryptError::Suffix {
            path: path.to_path_buf(),
            expected: format!("no {SUFFIX}"),
        });
    }

    // Fresh salt and IV, then the key derived from that salt
    let plaintext_len = input.metadata().with_path(path)?.len();
    let header = Header::generate(final_block_len_for(plaintext_len));
    let key = creds.key_for(&header.salt);
    let cipher = BlockCipher::new(key.as_bytes())?;

    // Header first, ciphertext blocks follow
    let output_path = container::encrypted_path(path);
    let mut output = File::create(&output_path).with_path(&output_path)?;
    container::write_header(&mut output, &header, &output_path)?;

    let blocks = chain::encrypt_stream(
        input,
        output,
        &cipher,
        header.iv,
        plaintext_len,
        path,
        &output_path,
    )?;
    debug_assert_eq!(blocks, block_count_for(plaintext_len));
    debug!(path = %path.display(), blocks, "encrypted");

    Ok(output_path)
}
