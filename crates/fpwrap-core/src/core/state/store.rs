use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use fpwrap_domain::{AliasTable, ApplicationId, LaunchTarget};

pub(crate) const BIN_DIR_POINTER: &str = "bin_dir";
pub(crate) const BLOCKLIST_FILE: &str = "blocklist";
pub(crate) const ALIASES_FILE: &str = "aliases";
pub(crate) const LOCK_FILE: &str = ".lock.generate";
pub(crate) const SCRIPTS_DIR: &str = "scripts";
pub(crate) const PRE_HOOK_FILE: &str = "pre-launch.sh";
pub(crate) const POST_HOOK_FILE: &str = "post-run.sh";

/// Single owner of the on-disk configuration layout.
///
/// Construction is pure; [`ConfigStore::prepare`] performs the directory
/// creation and can fail cleanly. Every write is temp-file + rename in the
/// target directory, so lock-free readers can never observe a torn file.
/// Readers tolerate missing files, blank lines, `#` comments and stray
/// whitespace; writers always produce sorted, deduplicated UTF-8 with a
/// trailing newline.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    root: PathBuf,
}

/// What a cascade delete actually touched, for logging and summaries.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub preference: bool,
    pub env: bool,
    pub scripts: bool,
    pub aliases: Vec<String>,
}

impl ConfigStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the configuration directory tree.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        Ok(())
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    // --- bin dir pointer -------------------------------------------------

    pub fn bin_dir_pointer_path(&self) -> PathBuf {
        self.root.join(BIN_DIR_POINTER)
    }

    pub fn read_bin_dir(&self) -> Result<Option<PathBuf>> {
        let Some(text) = read_optional(&self.bin_dir_pointer_path())? else {
            return Ok(None);
        };
        let line = text.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(line)))
    }

    pub fn write_bin_dir(&self, bin_dir: &Path) -> Result<()> {
        let mut text = bin_dir.to_string_lossy().to_string();
        text.push('\n');
        self.atomic_write(&self.bin_dir_pointer_path(), text.as_bytes(), false)
    }

    // --- preferences -----------------------------------------------------

    pub fn preference_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.pref"))
    }

    pub fn read_preference(&self, name: &str) -> Result<Option<LaunchTarget>> {
        let Some(text) = read_optional(&self.preference_path(name))? else {
            return Ok(None);
        };
        let token = text.trim();
        match LaunchTarget::parse_token(token) {
            Some(target) => Ok(Some(target)),
            None => {
                if !token.is_empty() {
                    tracing::warn!(name, token, "ignoring malformed preference file");
                }
                Ok(None)
            }
        }
    }

    pub fn write_preference(&self, name: &str, target: LaunchTarget) -> Result<()> {
        let text = format!("{}\n", target.as_token());
        self.atomic_write(&self.preference_path(name), text.as_bytes(), false)
    }

    pub fn remove_preference(&self, name: &str) -> Result<bool> {
        remove_if_present(&self.preference_path(name))
    }

    /// All `<name>.pref` files under the root, sorted by name.
    pub fn list_preferences(&self) -> Result<Vec<(String, LaunchTarget)>> {
        let mut out = Vec::new();
        for name in self.names_with_extension("pref")? {
            if let Some(target) = self.read_preference(&name)? {
                out.push((name, target));
            }
        }
        Ok(out)
    }

    // --- env overlays ----------------------------------------------------

    pub fn env_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.env"))
    }

    pub fn read_env(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let Some(text) = read_optional(&self.env_path(name))? else {
            return Ok(BTreeMap::new());
        };
        Ok(parse_env_overlay(&text))
    }

    pub fn write_env(&self, name: &str, vars: &BTreeMap<String, String>) -> Result<()> {
        if vars.is_empty() {
            remove_if_present(&self.env_path(name))?;
            return Ok(());
        }
        let text = render_env_overlay(vars);
        self.atomic_write(&self.env_path(name), text.as_bytes(), false)
    }

    pub fn remove_env(&self, name: &str) -> Result<bool> {
        remove_if_present(&self.env_path(name))
    }

    pub fn list_env_names(&self) -> Result<Vec<String>> {
        self.names_with_extension("env")
    }

    // --- hook scripts ----------------------------------------------------

    pub fn scripts_dir(&self, name: &str) -> PathBuf {
        self.root.join(SCRIPTS_DIR).join(name)
    }

    pub fn hook_path(&self, name: &str, hook_file: &str) -> PathBuf {
        self.scripts_dir(name).join(hook_file)
    }

    pub fn install_hook(&self, name: &str, hook_file: &str, source: &Path) -> Result<()> {
        let contents = fs::read(source)
            .with_context(|| format!("failed to read hook source {}", source.display()))?;
        let dest = self.hook_path(name, hook_file);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        self.atomic_write(&dest, &contents, true)
    }

    pub fn remove_hook(&self, name: &str, hook_file: &str) -> Result<bool> {
        let removed = remove_if_present(&self.hook_path(name, hook_file))?;
        // Drop the per-app directory once the last hook is gone.
        let dir = self.scripts_dir(name);
        if dir.is_dir() && dir.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false) {
            let _ = fs::remove_dir(&dir);
        }
        Ok(removed)
    }

    pub fn remove_scripts_dir(&self, name: &str) -> Result<bool> {
        let dir = self.scripts_dir(name);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to remove {}", dir.display()))?;
        Ok(true)
    }

    pub fn list_script_names(&self) -> Result<Vec<String>> {
        let dir = self.root.join(SCRIPTS_DIR);
        let mut names = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", dir.display()))
            }
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    // --- aliases ---------------------------------------------------------

    pub fn aliases_path(&self) -> PathBuf {
        self.root.join(ALIASES_FILE)
    }

    pub fn read_aliases(&self) -> Result<AliasTable> {
        let Some(text) = read_optional(&self.aliases_path())? else {
            return Ok(AliasTable::new());
        };
        Ok(AliasTable::parse(&text))
    }

    pub fn write_aliases(&self, table: &AliasTable) -> Result<()> {
        if table.is_empty() {
            remove_if_present(&self.aliases_path())?;
            return Ok(());
        }
        self.atomic_write(&self.aliases_path(), table.render().as_bytes(), false)
    }

    // --- blocklist -------------------------------------------------------

    pub fn blocklist_path(&self) -> PathBuf {
        self.root.join(BLOCKLIST_FILE)
    }

    pub fn read_blocklist(&self) -> Result<BTreeSet<String>> {
        let Some(text) = read_optional(&self.blocklist_path())? else {
            return Ok(BTreeSet::new());
        };
        let mut set = BTreeSet::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if ApplicationId::looks_valid(line) {
                set.insert(line.to_string());
            } else {
                tracing::warn!(line, "ignoring malformed blocklist entry");
            }
        }
        Ok(set)
    }

    pub fn write_blocklist(&self, ids: &BTreeSet<String>) -> Result<()> {
        if ids.is_empty() {
            remove_if_present(&self.blocklist_path())?;
            return Ok(());
        }
        let mut text = String::new();
        for id in ids {
            text.push_str(id);
            text.push('\n');
        }
        self.atomic_write(&self.blocklist_path(), text.as_bytes(), false)
    }

    // --- cascade ---------------------------------------------------------

    /// Removes every piece of state keyed by `name`: preference, env overlay,
    /// hook scripts, and aliases targeting it. The wrapper file itself is the
    /// caller's business.
    pub fn cascade_remove(&self, name: &str) -> Result<CascadeReport> {
        let mut report = CascadeReport {
            preference: self.remove_preference(name)?,
            env: self.remove_env(name)?,
            scripts: self.remove_scripts_dir(name)?,
            aliases: Vec::new(),
        };
        let mut aliases = self.read_aliases()?;
        let removed = aliases.remove_targeting(name);
        if !removed.is_empty() {
            self.write_aliases(&aliases)?;
            report.aliases = removed;
        }
        Ok(report)
    }

    // --- helpers ---------------------------------------------------------

    fn names_with_extension(&self, extension: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.root.display()))
            }
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub(crate) fn atomic_write(
        &self,
        path: &Path,
        contents: &[u8],
        executable: bool,
    ) -> Result<()> {
        atomic_write_file(path, contents, executable)
    }
}

/// Temp file in the destination directory, then rename. The mode is set
/// before the rename so no incomplete file is ever executable.
pub(crate) fn atomic_write_file(path: &Path, contents: &[u8], executable: bool) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    let mut temp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to create temp file under {}", parent.display()))?;
    io::Write::write_all(&mut temp, contents)
        .with_context(|| format!("failed to write staged {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if executable { 0o755 } else { 0o644 };
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to chmod staged {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = executable;

    persist_named_tempfile(temp, path)
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

fn persist_named_tempfile(tmp: NamedTempFile, dest: &Path) -> io::Result<()> {
    match tmp.persist(dest) {
        Ok(_) => Ok(()),
        Err(err) => {
            let file = err.file;
            if is_cross_device(&err.error) {
                let mut reader = file.reopen()?;
                let mut writer = fs::File::create(dest)?;
                io::copy(&mut reader, &mut writer)?;
                file.close().ok();
                Ok(())
            } else {
                Err(err.error)
            }
        }
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(18))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

fn parse_env_overlay(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

fn render_env_overlay(vars: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in vars {
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(value);
        out.push_str("\"\n");
    }
    out
}
