// chainvault - encrypt files and directory trees with AES-256 in CBC mode
// =======================================================
// Layers, leaves first:
// - kdf:          password + per-file salt -> 32-byte key
// - container:    on-disk header layout and file naming
// - chain:        block-by-block CBC chaining over the raw AES block cipher
// - task:         one file, one direction, one outcome
// - orchestrator: targets and directory trees, bounded concurrent fan-out
// - progress:     console reporting

pub mod chain;
pub mod container;
pub mod error;
pub mod kdf;
pub mod orchestrator;
pub mod progress;
pub mod task;

pub use error::{CryptError, Result};
pub use orchestrator::{Options, Orchestrator, RunSummary};
pub use progress::Reporter;
pub use task::{decrypt_file, encrypt_file, process_file, CredentialContext, Credentials, Mode, Outcome};
