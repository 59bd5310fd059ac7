//! Browser profile detection and per-family delegation probes.
//!
//! Profile stores are never parsed. A family probe only checks that the
//! browser has a profile on this machine (so a login there is plausible) and
//! then delegates to [`DirectApiProbe`].

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{
    DirectApiProbe, ExtractionStrategy, ProbeContext, ProbeError, ProbeOutcome, StrategyPriority,
};

/// Browser families with a known profile layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    Chrome,
    Chromium,
    Edge,
    Brave,
    Firefox,
    Opera,
    Safari,
}

const NON_MACOS_FAMILIES: [BrowserFamily; 6] = [
    BrowserFamily::Chrome,
    BrowserFamily::Chromium,
    BrowserFamily::Edge,
    BrowserFamily::Brave,
    BrowserFamily::Firefox,
    BrowserFamily::Opera,
];

const MACOS_FAMILIES: [BrowserFamily; 7] = [
    BrowserFamily::Chrome,
    BrowserFamily::Chromium,
    BrowserFamily::Edge,
    BrowserFamily::Brave,
    BrowserFamily::Firefox,
    BrowserFamily::Opera,
    BrowserFamily::Safari,
];

impl BrowserFamily {
    /// Families probed on this platform, in probe order.
    #[must_use]
    pub fn for_current_platform() -> &'static [BrowserFamily] {
        if cfg!(target_os = "macos") {
            &MACOS_FAMILIES
        } else {
            &NON_MACOS_FAMILIES
        }
    }

    /// Short lowercase identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
            Self::Edge => "edge",
            Self::Brave => "brave",
            Self::Firefox => "firefox",
            Self::Opera => "opera",
            Self::Safari => "safari",
        }
    }

    /// Profile directory candidates on this platform.
    #[must_use]
    pub fn candidate_paths(self, roots: &ProfileRoots) -> Vec<PathBuf> {
        candidate_table(Platform::current(), self)
            .iter()
            .filter_map(|(root, relative)| {
                roots.get(*root).map(|base| join_relative(base, relative))
            })
            .collect()
    }

    /// First existing profile directory, if any.
    #[must_use]
    pub fn locate(self, roots: &ProfileRoots) -> Option<PathBuf> {
        self.candidate_paths(roots)
            .into_iter()
            .find(|path| path.is_dir())
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Home,
    Config,
    DataLocal,
}

type Candidates = &'static [(RootKind, &'static str)];

fn candidate_table(platform: Platform, family: BrowserFamily) -> Candidates {
    use BrowserFamily as B;
    use RootKind::{Config, DataLocal, Home};

    match (platform, family) {
        (Platform::MacOs, B::Chrome) => &[(Home, "Library/Application Support/Google/Chrome")],
        (Platform::MacOs, B::Chromium) => &[(Home, "Library/Application Support/Chromium")],
        (Platform::MacOs, B::Edge) => &[(Home, "Library/Application Support/Microsoft Edge")],
        (Platform::MacOs, B::Brave) => &[(
            Home,
            "Library/Application Support/BraveSoftware/Brave-Browser",
        )],
        (Platform::MacOs, B::Firefox) => &[(Home, "Library/Application Support/Firefox/Profiles")],
        (Platform::MacOs, B::Opera) => {
            &[(Home, "Library/Application Support/com.operasoftware.Opera")]
        }
        (Platform::MacOs, B::Safari) => &[
            (Home, "Library/Containers/com.apple.Safari"),
            (Home, "Library/Safari"),
        ],

        (Platform::Windows, B::Chrome) => &[(DataLocal, "Google/Chrome/User Data")],
        (Platform::Windows, B::Chromium) => &[(DataLocal, "Chromium/User Data")],
        (Platform::Windows, B::Edge) => &[(DataLocal, "Microsoft/Edge/User Data")],
        (Platform::Windows, B::Brave) => {
            &[(DataLocal, "BraveSoftware/Brave-Browser/User Data")]
        }
        (Platform::Windows, B::Firefox) => &[(Config, "Mozilla/Firefox/Profiles")],
        (Platform::Windows, B::Opera) => &[(Config, "Opera Software/Opera Stable")],

        (Platform::Linux, B::Chrome) => &[(Config, "google-chrome")],
        (Platform::Linux, B::Chromium) => &[
            (Config, "chromium"),
            (Home, "snap/chromium/common/chromium"),
        ],
        (Platform::Linux, B::Edge) => &[(Config, "microsoft-edge")],
        (Platform::Linux, B::Brave) => &[(Config, "BraveSoftware/Brave-Browser")],
        (Platform::Linux, B::Firefox) => &[
            (Home, ".mozilla/firefox"),
            (Home, "snap/firefox/common/.mozilla/firefox"),
        ],
        (Platform::Linux, B::Opera) => &[(Config, "opera")],

        (Platform::Windows | Platform::Linux, B::Safari) => &[],
    }
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for component in relative.split('/') {
        path.push(component);
    }
    path
}

/// Base directories that profile candidates are resolved against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileRoots {
    home: Option<PathBuf>,
    config: Option<PathBuf>,
    data_local: Option<PathBuf>,
}

impl ProfileRoots {
    /// Roots from the current user's platform directories.
    #[must_use]
    pub fn from_system() -> Self {
        Self {
            home: dirs::home_dir(),
            config: dirs::config_dir(),
            data_local: dirs::data_local_dir(),
        }
    }

    /// No roots: every family resolves to "not installed".
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Uses one directory for home, config and local data.
    #[must_use]
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            home: Some(base.clone()),
            config: Some(base.clone()),
            data_local: Some(base),
        }
    }

    fn get(&self, kind: RootKind) -> Option<&Path> {
        match kind {
            RootKind::Home => self.home.as_deref(),
            RootKind::Config => self.config.as_deref(),
            RootKind::DataLocal => self.data_local.as_deref(),
        }
    }
}

/// A browser profile directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub family: BrowserFamily,
    pub path: PathBuf,
}

/// Lists profile directories for every family known on this platform.
#[must_use]
pub fn detect_browser_profiles(roots: &ProfileRoots) -> Vec<BrowserProfile> {
    BrowserFamily::for_current_platform()
        .iter()
        .filter_map(|family| {
            family.locate(roots).map(|path| BrowserProfile {
                family: *family,
                path,
            })
        })
        .collect()
}

/// Returns true when at least one known browser profile exists.
#[must_use]
pub fn has_any_known_browser(roots: &ProfileRoots) -> bool {
    BrowserFamily::for_current_platform()
        .iter()
        .any(|family| family.locate(roots).is_some())
}

/// Probe for one browser family.
#[derive(Debug, Clone)]
pub struct BrowserProfileProbe {
    family: BrowserFamily,
    roots: ProfileRoots,
    name: String,
}

impl BrowserProfileProbe {
    #[must_use]
    pub fn new(family: BrowserFamily, roots: ProfileRoots) -> Self {
        Self {
            family,
            roots,
            name: format!("{family}-profile"),
        }
    }

    #[must_use]
    pub fn family(&self) -> BrowserFamily {
        self.family
    }
}

#[async_trait]
impl ExtractionStrategy for BrowserProfileProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> StrategyPriority {
        StrategyPriority::BrowserDelegation
    }

    async fn attempt(&self, ctx: &ProbeContext) -> Result<ProbeOutcome, ProbeError> {
        let Some(profile) = self.family.locate(&self.roots) else {
            debug!(browser = %self.family, "No profile directory; skipping");
            return Ok(ProbeOutcome::NotFound);
        };
        debug!(
            browser = %self.family,
            profile = %profile.display(),
            "Profile present; delegating to direct API probe"
        );
        DirectApiProbe::new().attempt(ctx).await
    }
}
