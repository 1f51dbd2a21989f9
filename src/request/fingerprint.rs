//! Stable request digests used as cache keys.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::params::ParamContainer;
use crate::request::{Body, Method};

/// SHA-256 over method, path+query, headers and buffered body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(
        method: Method,
        path_query: &str,
        headers: &ParamContainer,
        body: Option<&Body>,
    ) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(path_query.as_bytes());
        hasher.update(b"\n");
        for (name, value) in headers.pairs() {
            hasher.update(name.as_bytes());
            hasher.update(b": ");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"\n");

        match body {
            None => {}
            Some(Body::Text(text)) => hasher.update(text.as_bytes()),
            Some(Body::Bytes(bytes)) => hasher.update(bytes),
            Some(Body::Marshall(marshall)) => {
                let canonical = serde_json::to_vec(&marshall.payload)
                    .map_err(|e| Error::processing(format!("payload not hashable: {e}")))?;
                hasher.update(&canonical);
            }
            Some(other) => {
                return Err(Error::RequestBuild(format!(
                    "{} bodies cannot be hashed for caching",
                    other.kind()
                )))
            }
        }

        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
