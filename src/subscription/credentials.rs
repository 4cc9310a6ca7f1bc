//! Per-user credential persistence.
//!
//! Credentials live in a JSON array of base64 strings. Missing entries are
//! generated and the file rewritten; surplus entries stay on disk unused.

use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

const SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("credential file is not a JSON string array: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fresh random credential: 32 bytes, base64 encoded.
pub fn generate_credential() -> String {
    let mut secret = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    STANDARD.encode(secret)
}

pub fn read_credentials(path: &Path) -> Result<Vec<String>, CredentialError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Write the credential file, owner-only on unix.
pub fn save_credentials(path: &Path, credentials: &[String]) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let data = serde_json::to_vec(credentials)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    io::Write::write_all(&mut file, &data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Return exactly `users` credentials, reusing what `path` holds.
///
/// Read and write failures are logged; the gateway still starts with
/// in-memory credentials.
pub fn load_or_generate(path: &Path, users: usize) -> Vec<String> {
    let mut credentials = match read_credentials(path) {
        Ok(existing) => existing,
        Err(CredentialError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable credential file");
            Vec::new()
        }
    };

    if credentials.len() >= users {
        tracing::info!(path = %path.display(), count = users, "Loaded credentials");
        credentials.truncate(users);
        return credentials;
    }

    let generated = users - credentials.len();
    credentials.extend((0..generated).map(|_| generate_credential()));
    match save_credentials(path, &credentials) {
        Ok(()) => tracing::info!(
            path = %path.display(),
            generated,
            total = credentials.len(),
            "Saved credentials"
        ),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save credentials"),
    }
    credentials
}
