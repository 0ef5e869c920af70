//! Object-store source adapter.
//!
//! The store client itself (signing, transport, pagination) is a
//! collaborator behind [`BlobClient`]; this adapter owns the content
//! policy: `.md` filtering happens in the indexer, provider etags lose
//! their surrounding quotes, and non-anonymous fetches go through a
//! 5-minute pre-signed URL followed by a plain GET.

use std::time::{Duration, Instant};

use anyhow::Result;

use super::{ContentSource, Object};

/// Pre-signed URLs are valid long enough for one fetch, no longer.
pub const PRESIGN_TTL: Duration = Duration::from_secs(5 * 60);

/// Transport-level object store operations, implemented by an embedder.
pub trait BlobClient: Send + Sync {
    /// Enumerate every object under `prefix`.
    fn list_objects(&self, prefix: &str) -> Result<Vec<Object>>;

    /// Direct GET by key (anonymous or credentialed).
    fn get_object(&self, key: &str, deadline: Option<Instant>) -> Result<Vec<u8>>;

    /// Produce a pre-signed GET URL for `key` valid for `expires`.
    fn presign_get(&self, key: &str, expires: Duration) -> Result<String>;

    /// Plain HTTP GET of a (pre-signed) URL.
    fn get_url(&self, url: &str, deadline: Option<Instant>) -> Result<Vec<u8>>;
}

pub struct RemoteSource {
    client: Box<dyn BlobClient>,
    anonymous: bool,
}

impl RemoteSource {
    pub fn new(client: Box<dyn BlobClient>, anonymous: bool) -> Self {
        Self { client, anonymous }
    }
}

impl ContentSource for RemoteSource {
    fn list(&self, prefix: &str) -> Result<Vec<Object>> {
        let mut objects = self.client.list_objects(prefix)?;
        for object in &mut objects {
            object.etag = strip_quotes(&object.etag);
        }
        Ok(objects)
    }

    fn fetch(&self, key: &str, deadline: Option<Instant>) -> Result<Vec<u8>> {
        if self.anonymous {
            return self.client.get_object(key, deadline);
        }
        let url = self.client.presign_get(key, PRESIGN_TTL)?;
        self.client.get_url(&url, deadline)
    }

    fn presigned_url(&self, key: &str) -> Option<Result<String>> {
        if self.anonymous {
            return None;
        }
        Some(self.client.presign_get(key, PRESIGN_TTL))
    }
}

/// Providers report etags wrapped in quotes; keys compare unquoted.
fn strip_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeClient {
        calls: Mutex<Vec<String>>,
    }

    impl BlobClient for FakeClient {
        fn list_objects(&self, prefix: &str) -> Result<Vec<Object>> {
            self.calls.lock().push(format!("list {prefix}"));
            Ok(vec![Object {
                key: format!("{prefix}intro.md"),
                etag: "\"abc123\"".to_string(),
                ..Object::default()
            }])
        }

        fn get_object(&self, key: &str, _deadline: Option<Instant>) -> Result<Vec<u8>> {
            self.calls.lock().push(format!("get {key}"));
            Ok(b"direct".to_vec())
        }

        fn presign_get(&self, key: &str, expires: Duration) -> Result<String> {
            self.calls.lock().push(format!("presign {key} {}", expires.as_secs()));
            Ok(format!("https://store.example/{key}?sig=x"))
        }

        fn get_url(&self, url: &str, _deadline: Option<Instant>) -> Result<Vec<u8>> {
            self.calls.lock().push(format!("geturl {url}"));
            Ok(b"presigned".to_vec())
        }
    }

    #[test]
    fn test_etag_quotes_stripped() {
        let source = RemoteSource::new(Box::new(FakeClient::default()), true);
        let objects = source.list("notes/").unwrap();
        assert_eq!(objects[0].etag, "abc123");
    }

    #[test]
    fn test_anonymous_fetch_goes_direct() {
        let source = RemoteSource::new(Box::new(FakeClient::default()), true);
        assert_eq!(source.fetch("notes/intro.md", None).unwrap(), b"direct");
    }

    #[test]
    fn test_credentialed_fetch_presigns() {
        let source = RemoteSource::new(Box::new(FakeClient::default()), false);
        assert_eq!(source.fetch("notes/intro.md", None).unwrap(), b"presigned");
    }

    #[test]
    fn test_presign_ttl_is_five_minutes() {
        let client = FakeClient::default();
        let _ = client.presign_get("k", PRESIGN_TTL);
        assert_eq!(PRESIGN_TTL.as_secs(), 300);
    }
}
