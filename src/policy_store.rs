use crate::identity::{self, IdentityResolver};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeSet,
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{info, warn};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Coarse access-control policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Everyone,
    ContactsOnly,
    Off,
    Personal,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Everyone, Mode::ContactsOnly, Mode::Off, Mode::Personal];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EVERYONE" => Some(Self::Everyone),
            "CONTACTS_ONLY" => Some(Self::ContactsOnly),
            "OFF" => Some(Self::Off),
            "PERSONAL" => Some(Self::Personal),
            _ => None,
        }
    }

    /// Parse a persisted mode value, falling back to `PERSONAL` when it is missing,
    /// not a string, unknown, or not enabled in `valid`.
    pub fn from_persisted(raw: Option<&Value>, valid: &ValidModes) -> Self {
        raw.and_then(|v| v.as_str())
            .and_then(Self::parse)
            .filter(|m| valid.contains(*m))
            .unwrap_or(Self::Personal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Everyone => "EVERYONE",
            Self::ContactsOnly => "CONTACTS_ONLY",
            Self::Off => "OFF",
            Self::Personal => "PERSONAL",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of modes an operator allows the persisted policy to select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidModes(BTreeSet<Mode>);

impl ValidModes {
    /// Parse a comma-separated list. Unknown names are ignored; an empty result
    /// means every mode is valid.
    pub fn parse(list: &str) -> Self {
        let mut set = BTreeSet::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match Mode::parse(part) {
                Some(m) => {
                    set.insert(m);
                }
                None => warn!(mode = part, "ignoring unknown mode in valid mode list"),
            }
        }
        if set.is_empty() {
            return Self::default();
        }
        Self(set)
    }

    pub fn contains(&self, mode: Mode) -> bool {
        self.0.contains(&mode)
    }

    pub fn iter(&self) -> impl Iterator<Item = Mode> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ValidModes {
    fn default() -> Self {
        Self(Mode::ALL.into_iter().collect())
    }
}

/// Validated access policy. Only ever replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRecord {
    pub mode: Mode,
    pub personal_user_id: u64,
    pub contacts_user_ids: BTreeSet<u64>,
}

impl PolicyRecord {
    pub fn first_run(personal_user_id: u64) -> Self {
        Self {
            mode: Mode::Personal,
            personal_user_id,
            contacts_user_ids: BTreeSet::new(),
        }
    }

    /// Validate a raw on-disk document.
    pub fn from_raw(raw: &RawPolicyFile, valid: &ValidModes) -> Self {
        let mode = Mode::from_persisted(raw.mode.as_ref(), valid);
        let personal_user_id = raw
            .personal_user_id
            .as_ref()
            .and_then(identity::coerce_id)
            .filter(|id| *id > 0)
            .map(|id| id as u64)
            .unwrap_or(0);
        let contacts_user_ids = raw
            .contacts_user_ids
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|ids| ids.iter().filter_map(identity::user_id_from_value).collect())
            .unwrap_or_default();

        Self {
            mode,
            personal_user_id,
            contacts_user_ids,
        }
    }
}

/// On-disk policy document. Fields stay loosely typed until [`PolicyRecord::from_raw`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPolicyFile {
    #[serde(default)]
    pub mode: Option<Value>,
    #[serde(default)]
    pub personal_user_id: Option<Value>,
    #[serde(default)]
    pub contacts_user_ids: Option<Value>,
}

impl RawPolicyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading policy file: {}", path.display()))?;
        let doc: Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in policy file: {}", path.display()))?;
        if !doc.is_object() {
            return Err(anyhow!(
                "policy file must contain a JSON object: {}",
                path.display()
            ));
        }
        let pf: RawPolicyFile = serde_json::from_value(doc)
            .with_context(|| format!("unexpected policy file layout: {}", path.display()))?;
        Ok(pf)
    }
}

impl From<&PolicyRecord> for RawPolicyFile {
    fn from(rec: &PolicyRecord) -> Self {
        Self {
            mode: Some(Value::from(rec.mode.as_str())),
            personal_user_id: Some(Value::from(rec.personal_user_id)),
            contacts_user_ids: Some(Value::from(
                rec.contacts_user_ids.iter().copied().collect::<Vec<u64>>(),
            )),
        }
    }
}

/// Where the policy lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

impl PolicyPaths {
    pub fn new(config_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            config_path: config_path.into(),
        }
    }

    /// `<dir>/config.json`
    pub fn in_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let config_path = config_dir.join("config.json");
        Self {
            config_dir,
            config_path,
        }
    }
}

/// Read and validate an existing policy file. A missing file is an error here.
pub fn read_existing(paths: &PolicyPaths, valid: &ValidModes) -> Result<PolicyRecord> {
    if !paths.config_path.is_file() {
        bail!("policy file missing: {}", paths.config_path.display());
    }
    let raw = RawPolicyFile::load(&paths.config_path)?;
    Ok(PolicyRecord::from_raw(&raw, valid))
}

/// Load the policy, creating a first-run default when no file exists yet.
///
/// An existing file that cannot be read or parsed is never overwritten.
pub async fn load(
    paths: &PolicyPaths,
    valid: &ValidModes,
    resolver: &dyn IdentityResolver,
) -> Result<PolicyRecord> {
    if paths.config_path.exists() {
        return read_existing(paths, valid);
    }

    let personal = match resolver.self_address().await {
        Some(addr) => resolver.resolve(addr).await.unwrap_or(0),
        None => 0,
    };
    if personal == 0 {
        warn!("could not resolve own user id; personal_user_id left unset");
    }

    let rec = PolicyRecord::first_run(personal);
    persist(paths, &rec)?;
    info!(
        path = %paths.config_path.display(),
        personal_user_id = personal,
        "created default policy file"
    );

    Ok(PolicyRecord::from_raw(&RawPolicyFile::from(&rec), valid))
}

/// Write the policy as pretty JSON via temp file + rename.
pub fn persist(paths: &PolicyPaths, rec: &PolicyRecord) -> Result<()> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("failed creating {}", paths.config_dir.display()))?;
    let parent = paths
        .config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("failed creating {}", parent.display()))?;

    let mut raw = serde_json::to_string_pretty(&RawPolicyFile::from(rec))?;
    raw.push('\n');

    let temp_path = temp_path_for(&paths.config_path, parent);
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options
        .open(&temp_path)
        .with_context(|| format!("failed creating {}", temp_path.display()))?;
    file.write_all(raw.as_bytes())?;
    if let Err(err) = file.sync_all() {
        warn!(error = %err, path = %temp_path.display(), "failed to fsync policy temp file");
    }
    drop(file);

    if let Err(err) = fs::rename(&temp_path, &paths.config_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err).with_context(|| {
            format!("failed replacing policy file {}", paths.config_path.display())
        });
    }
    Ok(())
}

fn temp_path_for(path: &Path, parent: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("config.json");
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    parent.join(format!(".{}.tmp.{}.{}", file_name, std::process::id(), nanos))
}

/// Shared, read-mostly policy holder.
///
/// Readers take an `Arc` snapshot; reload swaps in a freshly validated record.
#[derive(Debug)]
pub struct PolicyStore {
    paths: PolicyPaths,
    valid: ValidModes,
    current: RwLock<Arc<PolicyRecord>>,
}

impl PolicyStore {
    pub async fn open(
        paths: PolicyPaths,
        valid: ValidModes,
        resolver: &dyn IdentityResolver,
    ) -> Result<Self> {
        let rec = load(&paths, &valid, resolver).await?;
        Ok(Self::from_record(paths, valid, rec))
    }

    pub fn from_record(paths: PolicyPaths, valid: ValidModes, rec: PolicyRecord) -> Self {
        Self {
            paths,
            valid,
            current: RwLock::new(Arc::new(rec)),
        }
    }

    pub fn snapshot(&self) -> Arc<PolicyRecord> {
        // Writers only swap the Arc, so a poisoned lock still holds a complete record.
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-read the policy file. On error the current snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<PolicyRecord>> {
        let rec = Arc::new(read_existing(&self.paths, &self.valid)?);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = rec.clone();
        info!(
            mode = %rec.mode,
            personal_user_id = rec.personal_user_id,
            contacts = rec.contacts_user_ids.len(),
            "policy reloaded"
        );
        Ok(rec)
    }

    pub fn paths(&self) -> &PolicyPaths {
        &self.paths
    }

    pub fn valid_modes(&self) -> &ValidModes {
        &self.valid
    }
}
