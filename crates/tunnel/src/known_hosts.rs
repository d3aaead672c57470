// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Known Hosts
// Verifies the jump host key against an OpenSSH-style known_hosts file

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use jump_tunnel_common::{Error, Result};

/// Result of host key verification
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyResult {
    /// Host key is recorded and matches
    Trusted,
    /// No key recorded for this host
    Unknown,
    /// A different key is recorded for this host
    Mismatch { line_number: usize },
}

/// One `host key_type key_data [comment]` line
#[derive(Debug, Clone)]
struct KnownHostEntry {
    host_pattern: String,
    key_type: String,
    key_data: String,
    comment: Option<String>,
    line_number: usize,
}

impl KnownHostEntry {
    fn parse(line: &str, line_number: usize) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut parts = line.split_whitespace();
        let (Some(host_pattern), Some(key_type), Some(key_data)) =
            (parts.next(), parts.next(), parts.next())
        else {
            warn!(
                "Invalid known_hosts entry at line {}: too few fields",
                line_number
            );
            return None;
        };

        Some(KnownHostEntry {
            host_pattern: host_pattern.to_string(),
            key_type: key_type.to_string(),
            key_data: key_data.to_string(),
            comment: parts.next().map(str::to_string),
            line_number,
        })
    }

    fn format(&self) -> String {
        match &self.comment {
            Some(comment) => format!(
                "{} {} {} {}",
                self.host_pattern, self.key_type, self.key_data, comment
            ),
            None => format!("{} {} {}", self.host_pattern, self.key_type, self.key_data),
        }
    }

    /// Patterns may list several hosts separated by commas
    fn matches(&self, host: &str, port: u16) -> bool {
        let pattern = format_host_pattern(host, port);
        self.host_pattern.split(',').any(|candidate| candidate == pattern)
    }

    fn verify_key(&self, key: &PublicKey) -> bool {
        self.key_type == key_type_to_string(key) && self.key_data == key.public_key_base64()
    }
}

/// In-memory view of a known_hosts file
pub struct KnownHosts {
    path: PathBuf,
    entries: Vec<KnownHostEntry>,
}

impl KnownHosts {
    /// Load known_hosts from `path`; a missing file is an empty list
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut entries = Vec::new();

        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                Error::HostKey(format!(
                    "Failed to read known_hosts file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            entries.extend(
                contents
                    .lines()
                    .enumerate()
                    .filter_map(|(idx, line)| KnownHostEntry::parse(line, idx + 1)),
            );
            debug!(
                "Loaded {} entries from known_hosts: {}",
                entries.len(),
                path.display()
            );
        } else {
            info!("Known_hosts file does not exist yet: {}", path.display());
        }

        Ok(KnownHosts {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> VerifyResult {
        let mut matching = self.entries.iter().filter(|e| e.matches(host, port)).peekable();

        let Some(first) = matching.peek().map(|e| e.line_number) else {
            return VerifyResult::Unknown;
        };

        if matching.any(|entry| entry.verify_key(key)) {
            VerifyResult::Trusted
        } else {
            VerifyResult::Mismatch { line_number: first }
        }
    }

    pub fn add(&mut self, host: &str, port: u16, key: &PublicKey) {
        self.entries.push(KnownHostEntry {
            host_pattern: format_host_pattern(host, port),
            key_type: key_type_to_string(key),
            key_data: key.public_key_base64(),
            comment: None,
            line_number: self.entries.len() + 1,
        });
        info!("Added host key for {}:{} to known_hosts", host, port);
    }

    /// Write all entries back to disk (0600 on Unix)
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&self.path)?;
        writeln!(file, "# Jump Tunnel - Known Hosts")?;
        for entry in &self.entries {
            writeln!(file, "{}", entry.format())?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(
            "Saved {} entries to known_hosts: {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// "host" for port 22, "[host]:port" otherwise
fn format_host_pattern(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

/// Algorithm name from the SSH wire encoding of the key
fn key_type_to_string(key: &PublicKey) -> String {
    let key_bytes = key.public_key_bytes();
    let Some(len_bytes) = key_bytes.get(..4) else {
        return "unknown".to_string();
    };

    let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    match key_bytes.get(4..4 + len) {
        Some(name) => String::from_utf8_lossy(name).to_string(),
        None => "unknown".to_string(),
    }
}

/// SHA256 fingerprint in OpenSSH notation
pub fn calculate_fingerprint(key: &PublicKey) -> String {
    let digest = Sha256::digest(key.public_key_bytes());
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest);
    format!("SHA256:{}", encoded)
}
