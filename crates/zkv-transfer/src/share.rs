//! Share links: `{base}/files/{id}#{key}`
//!
//! The key rides in the URL fragment, which HTTP clients do not send, so the
//! server never sees it. Anyone holding the link can decrypt the file for as
//! long as its chunks exist; there is no expiry or revocation short of
//! deleting the upload.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;
use zkv_core::{ZkvError, ZkvResult};
use zkv_crypto::FileKey;

const FILES_SEGMENT: &str = "/files/";

#[derive(Debug, Clone)]
pub struct ShareLink {
    /// Server base URL without a trailing slash
    pub base: String,
    pub id: Uuid,
    pub key: FileKey,
}

impl ShareLink {
    pub fn new(base: &str, id: Uuid, key: FileKey) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            id,
            key,
        }
    }

    pub fn parse(link: &str) -> ZkvResult<Self> {
        let (url, fragment) = link
            .split_once('#')
            .ok_or_else(|| ZkvError::protocol("share link has no key fragment"))?;
        let at = url
            .rfind(FILES_SEGMENT)
            .ok_or_else(|| ZkvError::protocol("share link has no /files/ path"))?;
        let base = &url[..at];
        let id = url[at + FILES_SEGMENT.len()..].trim_end_matches('/');
        let id = Uuid::parse_str(id)
            .map_err(|e| ZkvError::protocol(format!("share link id: {e}")))?;
        let key = FileKey::from_fragment(fragment)?;
        Ok(Self::new(base, id, key))
    }
}

impl fmt::Display for ShareLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FILES_SEGMENT}{}#{}",
            self.base,
            self.id,
            self.key.to_fragment()
        )
    }
}

impl FromStr for ShareLink {
    type Err = ZkvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkv_crypto::generate_file_key;

    #[test]
    fn format_and_parse() {
        let id = Uuid::new_v4();
        let key = generate_file_key();
        let link = ShareLink::new("https://vault.example.com/", id, key.clone());
        let text = link.to_string();
        assert!(text.starts_with(&format!("https://vault.example.com/files/{id}#")));

        let parsed: ShareLink = text.parse().unwrap();
        assert_eq!(parsed.base, "https://vault.example.com");
        assert_eq!(parsed.id, id);
        assert_eq!(parsed.key.as_bytes(), key.as_bytes());
    }

    #[test]
    fn base_with_path_prefix() {
        let id = Uuid::new_v4();
        let link = ShareLink::new("http://host:8700/vault", id, generate_file_key());
        let parsed = ShareLink::parse(&link.to_string()).unwrap();
        assert_eq!(parsed.base, "http://host:8700/vault");
    }

    #[test]
    fn rejects_malformed_links() {
        let id = Uuid::new_v4();
        let frag = generate_file_key().to_fragment();
        assert!(ShareLink::parse(&format!("http://h/files/{id}")).is_err());
        assert!(ShareLink::parse(&format!("http://h/other/{id}#{frag}")).is_err());
        assert!(ShareLink::parse(&format!("http://h/files/nope#{frag}")).is_err());
        assert!(ShareLink::parse(&format!("http://h/files/{id}#short")).is_err());
    }

    #[test]
    fn debug_hides_key() {
        let link = ShareLink::new("http://h", Uuid::nil(), generate_file_key());
        assert!(format!("{link:?}").contains("REDACTED"));
    }
}
