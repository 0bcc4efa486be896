//! Session cookie extraction and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::transport::HttpResponse;

/// Cookie the legacy server issues for authenticated sessions.
pub const SESSION_COOKIE_NAME: &str = "WASID4D";

/// Older cookie name some server builds still send.
pub const FALLBACK_COOKIE_NAME: &str = "4DSID";

/// Pull the session cookie out of a login response.
///
/// `WASID4D` wins over `4DSID` wherever it appears; within one name the raw
/// `Set-Cookie` headers are consulted before the parsed cookie jar.
pub fn extract_session_cookie(response: &HttpResponse) -> Option<String> {
    [SESSION_COOKIE_NAME, FALLBACK_COOKIE_NAME]
        .into_iter()
        .find_map(|name| find_cookie(response, name))
}

fn find_cookie(response: &HttpResponse, name: &str) -> Option<String> {
    let from_header = response.set_cookie_headers().find_map(|header| {
        let (key, value) = header.split(';').next()?.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"').to_string())
    });

    from_header
        .or_else(|| {
            response
                .cookies
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        })
        .filter(|value| !value.is_empty())
}

/// Persisted form of a session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub environment: String,
}

/// On-disk cookie store, one JSON file per environment.
///
/// Reads and writes go through `tokio::fs` and are serialized by an internal
/// lock. Nothing protects against a second process writing the same
/// directory.
#[derive(Debug)]
pub struct CookieFile {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl CookieFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the cookie for `environment`.
    pub fn path_for(&self, environment: &str) -> PathBuf {
        let safe: String = environment
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.session.json", safe))
    }

    /// Load the cookie for `environment`, if one was saved.
    ///
    /// A corrupt file is treated as absent.
    pub async fn load(&self, environment: &str) -> Result<Option<StoredCookie>> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(environment);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<StoredCookie>(&content) {
            Ok(stored) if stored.environment == environment && !stored.value.is_empty() => {
                Ok(Some(stored))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, stored: &StoredCookie) -> Result<()> {
        let _guard = self.lock.lock().await;
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&stored.environment);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(stored)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Delete the saved cookie. Missing files are fine.
    pub async fn remove(&self, environment: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(self.path_for(environment)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_primary_name() {
        let response = HttpResponse::new(200, "{}")
            .with_header("Set-Cookie", "4DSID=legacy; path=/")
            .with_header("Set-Cookie", "WASID4D=primary; path=/; HttpOnly");

        assert_eq!(extract_session_cookie(&response).as_deref(), Some("primary"));
    }

    #[test]
    fn test_extract_from_jar_when_header_missing() {
        let response = HttpResponse::new(200, "{}").with_cookie("WASID4D", "from-jar");
        assert_eq!(extract_session_cookie(&response).as_deref(), Some("from-jar"));
    }

    #[test]
    fn test_extract_primary_in_jar_beats_fallback_in_header() {
        let response = HttpResponse::new(200, "{}")
            .with_header("Set-Cookie", "4DSID=legacy")
            .with_cookie("WASID4D", "from-jar");
        assert_eq!(extract_session_cookie(&response).as_deref(), Some("from-jar"));
    }

    #[test]
    fn test_extract_fallback_name() {
        let response = HttpResponse::new(200, "{}").with_header("Set-Cookie", "4DSID=legacy; path=/");
        assert_eq!(extract_session_cookie(&response).as_deref(), Some("legacy"));
    }

    #[test]
    fn test_extract_none() {
        let response = HttpResponse::new(200, "{}")
            .with_header("Set-Cookie", "theme=dark")
            .with_header("Set-Cookie", "WASID4D=; Max-Age=0");
        assert_eq!(extract_session_cookie(&response), None);
    }

    #[tokio::test]
    async fn test_store_is_keyed_by_environment() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieFile::new(dir.path());

        let live = StoredCookie {
            name: SESSION_COOKIE_NAME.to_string(),
            value: "live-cookie".to_string(),
            created_at: Utc::now(),
            environment: "live".to_string(),
        };
        store.save(&live).await.unwrap();

        assert_eq!(store.load("live").await.unwrap(), Some(live));
        assert_eq!(store.load("test").await.unwrap(), None);

        store.remove("live").await.unwrap();
        assert_eq!(store.load("live").await.unwrap(), None);
        store.remove("live").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieFile::new(dir.path());
        std::fs::write(store.path_for("live"), "not json").unwrap();

        assert_eq!(store.load("live").await.unwrap(), None);
    }

    #[test]
    fn test_path_sanitizes_environment() {
        let store = CookieFile::new("/tmp/sessions");
        assert_eq!(
            store.path_for("../live"),
            PathBuf::from("/tmp/sessions/___live.session.json")
        );
    }
}
