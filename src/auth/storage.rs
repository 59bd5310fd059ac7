//! Durable session state on disk.
//!
//! Two files live in the per-user data directory:
//! - `cookies.json`: array of `{name, value, domain, path, expires, httpOnly, secure}`
//! - `auth.json`: `{timestamp, cookiesFile}` marking when the session was established
//!
//! The cookie file is always written before the auth record and removed after
//! it, so an auth record never points at a missing cookie file.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{CookieJar, SessionCredential};

const APP_DIR_NAME: &str = "v0-session";
const AUTH_FILE_NAME: &str = "auth.json";
const COOKIES_FILE_NAME: &str = "cookies.json";

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "V0_SESSION_HOME";

/// Errors for session state storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No suitable user data directory is available.
    #[error("unable to determine data directory (set V0_SESSION_HOME, XDG_CONFIG_HOME or HOME)")]
    DataDirUnavailable,
    /// Filesystem I/O failed.
    #[error("session file I/O failed for {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Serialization/deserialization failed.
    #[error("session file {path} is not valid JSON: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Refused to write an auth record for an empty cookie jar.
    #[error("refusing to persist an empty cookie jar")]
    EmptyJar,
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persisted marker recording when a session was established and where its
/// cookies live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub created_at_epoch_millis: i64,
    /// Path of the cookie file.
    #[serde(rename = "cookiesFile")]
    pub cookie_jar_ref: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    /// Max-Age in seconds, `null` for session cookies.
    expires: Option<i64>,
    http_only: bool,
    secure: bool,
}

impl StoredCookie {
    fn from_credential(cookie: &SessionCredential) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value().to_string(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie.max_age_seconds,
            http_only: cookie.http_only,
            secure: cookie.secure,
        }
    }

    fn into_credential(self) -> SessionCredential {
        SessionCredential::new(self.name, self.value, self.domain)
            .with_path(self.path)
            .with_max_age(self.expires)
            .with_flags(self.http_only, self.secure)
    }
}

/// On-disk session state: pure data access, no validity policy.
#[derive(Debug, Clone)]
pub struct AuthStateStore {
    dir: PathBuf,
}

impl AuthStateStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store in the default per-user data directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DataDirUnavailable`] if no usable directory is found.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(default_data_dir()?))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn auth_path(&self) -> PathBuf {
        self.dir.join(AUTH_FILE_NAME)
    }

    #[must_use]
    pub fn cookies_path(&self) -> PathBuf {
        self.dir.join(COOKIES_FILE_NAME)
    }

    /// Returns true iff the auth record file is present.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.auth_path().is_file()
    }

    /// Returns true iff the cookie file is present.
    #[must_use]
    pub fn cookie_jar_present(&self) -> bool {
        self.cookies_path().is_file()
    }

    /// Loads the auth record; `Ok(None)` when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record exists but cannot be read or parsed.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self) -> Result<Option<AuthRecord>, StoreError> {
        let path = self.auth_path();
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read(&path).map_err(|source| StoreError::io(&path, source))?;
        let record = serde_json::from_slice::<AuthRecord>(&raw)
            .map_err(|source| StoreError::Json { path, source })?;
        Ok(Some(record))
    }

    /// Persists cookies and then a fresh auth record stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyJar`] for an empty jar, or an I/O / JSON error.
    pub fn save(&self, cookies: &CookieJar) -> Result<AuthRecord, StoreError> {
        self.save_at(cookies, epoch_millis_now())
    }

    #[instrument(level = "debug", skip(self, cookies), fields(count = cookies.len()))]
    pub(crate) fn save_at(
        &self,
        cookies: &CookieJar,
        created_at_epoch_millis: i64,
    ) -> Result<AuthRecord, StoreError> {
        if cookies.is_empty() {
            return Err(StoreError::EmptyJar);
        }
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::io(&self.dir, source))?;

        let cookies_path = self.cookies_path();
        let stored = cookies
            .iter()
            .map(StoredCookie::from_credential)
            .collect::<Vec<_>>();
        let payload = serde_json::to_vec_pretty(&stored).map_err(|source| StoreError::Json {
            path: cookies_path.clone(),
            source,
        })?;
        write_file_atomically(&cookies_path, &payload)?;

        let record = AuthRecord {
            created_at_epoch_millis,
            cookie_jar_ref: cookies_path,
        };
        let auth_path = self.auth_path();
        let payload = serde_json::to_vec_pretty(&record).map_err(|source| StoreError::Json {
            path: auth_path.clone(),
            source,
        })?;
        write_file_atomically(&auth_path, &payload)?;

        info!(
            cookies = cookies.len(),
            path = %self.dir.display(),
            "Saved session state"
        );
        Ok(record)
    }

    /// Deletes the auth record and the cookie file; missing files are not an error.
    ///
    /// Both deletions are attempted even if the first fails; the first failure
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when a present file cannot be removed.
    pub fn clear(&self) -> Result<(), StoreError> {
        let auth_result = remove_if_present(&self.auth_path());
        let cookies_result = remove_if_present(&self.cookies_path());
        auth_result.and(cookies_result)
    }

    /// Loads the persisted cookies, de-duplicated by name (last entry wins).
    ///
    /// Read and parse failures are logged and yield an empty jar.
    #[instrument(level = "debug", skip(self))]
    pub fn load_cookies(&self) -> CookieJar {
        let path = self.cookies_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted cookie file");
                return CookieJar::new();
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "Failed to read persisted cookies");
                return CookieJar::new();
            }
        };

        match serde_json::from_slice::<Vec<StoredCookie>>(&raw) {
            Ok(stored) => stored
                .into_iter()
                .map(StoredCookie::into_credential)
                .collect(),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "Failed to parse persisted cookies");
                CookieJar::new()
            }
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed session file");
            Ok(())
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(StoreError::io(path, error)),
    }
}

/// Writes to a sibling temp file and renames it into place.
fn write_file_atomically(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    let mut tmp_name = path.file_name().map(OsString::from).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, payload).map_err(|source| StoreError::io(&tmp_path, source))?;
    set_owner_only_permissions(&tmp_path)?;
    fs::rename(&tmp_path, path).map_err(|source| StoreError::io(path, source))?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions).map_err(|source| StoreError::io(path, source))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| {
            i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
        })
}

/// Returns the default data directory.
///
/// Priority: `$V0_SESSION_HOME` → `$XDG_CONFIG_HOME/v0-session` →
/// `$HOME/.config/v0-session` → `%APPDATA%\v0-session`.
///
/// # Errors
///
/// Returns [`StoreError::DataDirUnavailable`] if no source is set.
pub fn default_data_dir() -> Result<PathBuf, StoreError> {
    if let Some(explicit) = sanitize_env_path(env::var_os(DATA_DIR_ENV)) {
        return Ok(explicit);
    }
    resolve_data_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_data_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, StoreError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(StoreError::DataDirUnavailable)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample_jar() -> CookieJar {
        [
            SessionCredential::new("next-auth.session-token", "secret", "v0.dev")
                .with_max_age(Some(3600))
                .with_flags(true, true),
            SessionCredential::new("theme", "dark", "v0.dev"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_fresh_store_has_nothing() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path().join("state"));
        assert!(!store.exists());
        assert!(!store.cookie_jar_present());
        assert!(store.load().unwrap().is_none());
        assert!(store.load_cookies().is_empty());
    }

    #[test]
    fn test_save_writes_both_files_and_record() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        let record = store.save_at(&sample_jar(), 1_234).unwrap();

        assert!(store.exists());
        assert!(store.cookie_jar_present());
        assert_eq!(record.created_at_epoch_millis, 1_234);
        assert_eq!(record.cookie_jar_ref, store.cookies_path());
        assert_eq!(store.load().unwrap(), Some(record));
    }

    #[test]
    fn test_save_and_load_cookies_round_trip() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        let jar = sample_jar();
        store.save(&jar).unwrap();

        let loaded = store.load_cookies();
        assert_eq!(loaded, jar);
        let token = loaded.get("next-auth.session-token").unwrap();
        assert_eq!(token.value(), "secret");
        assert_eq!(token.max_age_seconds, Some(3600));
        assert!(token.http_only && token.secure);
    }

    #[test]
    fn test_file_formats_use_wire_names() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        store.save_at(&sample_jar(), 42).unwrap();

        let auth: serde_json::Value =
            serde_json::from_slice(&fs::read(store.auth_path()).unwrap()).unwrap();
        assert_eq!(auth["timestamp"], 42);
        assert!(auth["cookiesFile"].as_str().unwrap().ends_with("cookies.json"));

        let cookies: serde_json::Value =
            serde_json::from_slice(&fs::read(store.cookies_path()).unwrap()).unwrap();
        let first = &cookies[0];
        assert_eq!(first["name"], "next-auth.session-token");
        assert_eq!(first["expires"], 3600);
        assert_eq!(first["httpOnly"], true);
        assert!(cookies[1]["expires"].is_null());
    }

    #[test]
    fn test_save_empty_jar_refused_and_writes_nothing() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        assert!(matches!(
            store.save(&CookieJar::new()),
            Err(StoreError::EmptyJar)
        ));
        assert!(!store.exists());
        assert!(!store.cookie_jar_present());
    }

    #[test]
    fn test_clear_removes_both_and_tolerates_missing() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        store.clear().unwrap();

        store.save(&sample_jar()).unwrap();
        store.clear().unwrap();
        assert!(!store.exists());
        assert!(!store.cookie_jar_present());
    }

    #[test]
    fn test_load_cookies_dedupes_last_write_wins() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        fs::write(
            store.cookies_path(),
            r#"[
  {"name":"sid","value":"old","domain":"v0.dev","path":"/","expires":null,"httpOnly":false,"secure":false},
  {"name":"sid","value":"new","domain":"v0.dev","path":"/","expires":null,"httpOnly":false,"secure":false}
]"#,
        )
        .unwrap();

        let loaded = store.load_cookies();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("sid").unwrap().value(), "new");
    }

    #[test]
    fn test_load_cookies_corrupt_file_yields_empty() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        fs::write(store.cookies_path(), b"not json").unwrap();
        assert!(store.load_cookies().is_empty());
    }

    #[test]
    fn test_load_corrupt_record_is_error() {
        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        fs::write(store.auth_path(), b"{").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_sanitize_env_path_rejects_blank_values() {
        assert!(sanitize_env_path(Some(OsString::from(""))).is_none());
        assert!(sanitize_env_path(Some(OsString::from("   "))).is_none());
    }

    #[test]
    fn test_resolve_data_dir_prefers_xdg_over_home() {
        let resolved = resolve_data_dir(
            Some(PathBuf::from("/tmp/xdg")),
            Some(PathBuf::from("/tmp/home")),
            None,
        )
        .unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/xdg/v0-session"));
    }

    #[test]
    fn test_resolve_data_dir_falls_back_to_home_then_appdata() {
        let home = resolve_data_dir(None, Some(PathBuf::from("/tmp/home")), None).unwrap();
        assert_eq!(home, PathBuf::from("/tmp/home/.config/v0-session"));
        let app = resolve_data_dir(None, None, Some(PathBuf::from("/tmp/appdata"))).unwrap();
        assert_eq!(app, PathBuf::from("/tmp/appdata/v0-session"));
        assert!(matches!(
            resolve_data_dir(None, None, None),
            Err(StoreError::DataDirUnavailable)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let store = AuthStateStore::new(tempdir.path());
        store.save(&sample_jar()).unwrap();

        for path in [store.auth_path(), store.cookies_path()] {
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }
}
