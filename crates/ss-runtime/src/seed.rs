//! # Signer Seeding
//!
//! Loads signers from a TOML file into the compliance store at startup.
//!
//! ```toml
//! [[signers]]
//! id = "6f1c0c1e-8d1a-4a53-9a43-6f0d3c7a2b11"
//! document_id = "0b9e7d2c-5f4e-4c3b-8a1d-2e6f7a8b9c0d"
//! email = "anna.svensson@example.se"
//! name = "Hyresavtal 2024"
//! ```
//!
//! Signers already in the store are left untouched, so a restart never
//! clears a verified identity.

use serde::Deserialize;
use ss_safeprotocol::{DocumentId, Signer, SignerId, SignerRepository, StoreError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read signer file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse signer file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("signer {id}: {reason}")]
    Invalid { id: SignerId, reason: &'static str },

    #[error("failed to store signer: {0}")]
    Store(#[from] StoreError),
}

/// One signer entry of the seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignerSeed {
    pub id: SignerId,
    pub document_id: DocumentId,
    pub email: String,
    /// Document name shown in the BankID prompt.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedFile {
    #[serde(default)]
    signers: Vec<SignerSeed>,
}

/// Counts reported after a seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub existing: usize,
}

pub fn load_seed_file(path: &Path) -> Result<Vec<SignerSeed>, SeedError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: SeedFile = toml::from_str(&raw).map_err(|source| SeedError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    for seed in &file.signers {
        if seed.email.trim().is_empty() {
            return Err(SeedError::Invalid {
                id: seed.id,
                reason: "email is empty",
            });
        }
    }
    Ok(file.signers)
}

/// Insert every seed whose id is not yet in `repo`.
pub async fn seed_signers<R>(repo: &R, seeds: Vec<SignerSeed>) -> Result<SeedReport, SeedError>
where
    R: SignerRepository + ?Sized,
{
    let mut report = SeedReport::default();

    for seed in seeds {
        if repo.find_signer(seed.id).await?.is_some() {
            debug!(signer_id = %seed.id, "Signer already present; skipping");
            report.existing += 1;
            continue;
        }
        let signer = Signer::new(seed.id, seed.document_id, seed.email.trim(), seed.name);
        repo.insert_signer(signer).await?;
        report.inserted += 1;
    }

    info!(
        inserted = report.inserted,
        existing = report.existing,
        "Signer seeding complete"
    );
    Ok(report)
}
