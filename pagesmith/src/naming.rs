//! Artifact naming.
//!
//! Every (task, nonce) pair maps to exactly one repository name, and from it
//! one hosting path. The mapping is pure so round 2 finds what round 1 made.

use std::fmt;

use sha2::{Digest, Sha256};

/// GitHub caps repository names at 100 characters.
const MAX_NAME_LEN: usize = 100;

/// Digest bytes kept in a shortened name (hex-encoded, so twice as many chars).
const DIGEST_BYTES: usize = 6;

/// Stable name of one artifact lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Derive the repository name for a task lineage.
    ///
    /// Characters GitHub does not accept are replaced with `-` instead of
    /// failing, so any caller-supplied identifiers produce a usable name.
    /// Names over the length limit are cut and suffixed with a digest of the
    /// full `(task, nonce)` pair, so distinct lineages stay distinct.
    pub fn derive(task: &str, nonce: &str) -> Self {
        let (task, nonce) = (task.trim(), nonce.trim());
        let mut name: String = format!("{task}_{nonce}")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        if name.len() > MAX_NAME_LEN {
            let digest = Sha256::new()
                .chain_update(task.as_bytes())
                .chain_update([0u8])
                .chain_update(nonce.as_bytes())
                .finalize();
            let suffix = hex::encode(&digest[..DIGEST_BYTES]);
            // every char is ASCII by now, so byte and char positions agree
            name.truncate(MAX_NAME_LEN - suffix.len() - 1);
            name.push('-');
            name.push_str(&suffix);
        }
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path under the owner's Pages domain where the artifact is served.
    pub fn hosting_path(&self) -> String {
        format!("/{}/", self.0)
    }

    /// Browser URL of the repository.
    pub fn repo_url(&self, owner: &str) -> String {
        format!("https://github.com/{owner}/{}", self.0)
    }

    /// Default Pages URL, used when the platform does not report one.
    pub fn pages_url(&self, owner: &str) -> String {
        format!(
            "https://{}.github.io{}",
            owner.to_ascii_lowercase(),
            self.hosting_path()
        )
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
