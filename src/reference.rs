//! Parsing of `repo:tag` and `repo@digest` strings.

use std::fmt;

use crate::error::{RegistryError, Result};

const DIGEST_PREFIX: &str = "sha256:";
const DEFAULT_TAG: &str = "latest";
const MAX_NAME_LEN: usize = 255;
const MAX_TAG_LEN: usize = 128;

/// What a client asked for: a repository plus either a tag or a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub remote_name: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl Reference {
    /// Parses `repo:tag`, `repo@digest` or a bare `repo` (tag `latest`).
    ///
    /// The digest of an `@` reference is kept verbatim; its format is checked
    /// by whoever reads the blob.
    pub fn parse(repo_and_ref: &str) -> Result<Self> {
        if let Some((repo, digest)) = repo_and_ref.split_once('@') {
            return Self::from_digest(repo, digest);
        }

        match repo_and_ref.rfind(':') {
            Some(idx) if !repo_and_ref[idx + 1..].contains('/') => {
                Self::from_tag(&repo_and_ref[..idx], &repo_and_ref[idx + 1..])
            }
            _ => Self::from_tag(repo_and_ref, DEFAULT_TAG),
        }
    }

    pub fn from_tag(repo: &str, tag: &str) -> Result<Self> {
        validate_name(repo)?;
        validate_tag(tag)?;
        Ok(Self {
            remote_name: repo.to_string(),
            tag: Some(tag.to_string()),
            digest: None,
        })
    }

    pub fn from_digest(repo: &str, digest: &str) -> Result<Self> {
        validate_name(repo)?;
        if digest.is_empty() {
            return Err(RegistryError::InvalidDigest(digest.to_string()));
        }
        Ok(Self {
            remote_name: repo.to_string(),
            tag: None,
            digest: Some(digest.to_string()),
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => write!(f, "{}@{}", self.remote_name, digest),
            (None, Some(tag)) => write!(f, "{}:{}", self.remote_name, tag),
            (None, None) => f.write_str(&self.remote_name),
        }
    }
}

/// Returns true if `s` is a `sha256:` digest with 64 lowercase hex characters.
pub fn is_digest(s: &str) -> bool {
    match s.strip_prefix(DIGEST_PREFIX) {
        Some(hex) => hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')),
        None => false,
    }
}

// Each component: [a-z0-9]+(?:[._-][a-z0-9]+)*
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.split('/').all(valid_component);
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

fn valid_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let Some((&first, _)) = bytes.split_first() else {
        return false;
    };
    let Some(&last) = bytes.last() else {
        return false;
    };
    if !is_alnum(first) || !is_alnum(last) {
        return false;
    }
    bytes.windows(2).all(|pair| match pair {
        [a, b] if is_separator(*a) => is_alnum(*b),
        [a, _] => is_alnum(*a),
        _ => true,
    }) && bytes.iter().all(|&b| is_alnum(b) || is_separator(b))
}

fn is_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn is_separator(b: u8) -> bool {
    matches!(b, b'.' | b'_' | b'-')
}

// [A-Za-z0-9_][A-Za-z0-9_.-]{0,127}
fn validate_tag(tag: &str) -> Result<()> {
    let bytes = tag.as_bytes();
    let valid = match bytes.split_first() {
        Some((&first, rest)) => {
            tag.len() <= MAX_TAG_LEN
                && (first.is_ascii_alphanumeric() || first == b'_')
                && rest
                    .iter()
                    .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidTag(tag.to_string()))
    }
}
