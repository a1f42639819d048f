use std::collections::{BTreeMap, BTreeSet};

/// Longest redirection chain the resolver will follow.
pub const ALIAS_RESOLVE_LIMIT: usize = 16;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AliasError {
    #[error("alias name is empty")]
    EmptyAlias,
    #[error("alias target is empty")]
    EmptyTarget,
    #[error("alias {0:?} already exists")]
    AlreadyExists(String),
    #[error("alias {0:?} would introduce a cycle or exceed the redirection depth")]
    CycleOrDepth(String),
    #[error("alias {0:?} does not exist")]
    NotFound(String),
}

/// In-memory form of the `aliases` file: an acyclic `alias -> target` table.
///
/// Parsing tolerates blank lines, `#` comments, and stray whitespace;
/// rendering always emits sorted, deduplicated `alias:target` lines with a
/// trailing newline so the file is stable under round-trips.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((alias, target)) = line.split_once(':') else {
                continue;
            };
            let alias = alias.trim();
            let target = target.trim();
            if alias.is_empty() || target.is_empty() {
                continue;
            }
            entries.insert(alias.to_string(), target.to_string());
        }
        Self { entries }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (alias, target) in &self.entries {
            out.push_str(alias);
            out.push(':');
            out.push_str(target);
            out.push('\n');
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(alias, target)| (alias.as_str(), target.as_str()))
    }

    /// Inserts `alias -> target`, refusing overwrites and cycles.
    pub fn insert(&mut self, alias: &str, target: &str) -> Result<(), AliasError> {
        let alias = alias.trim();
        let target = target.trim();
        if alias.is_empty() {
            return Err(AliasError::EmptyAlias);
        }
        if target.is_empty() {
            return Err(AliasError::EmptyTarget);
        }
        if self.entries.contains_key(alias) {
            return Err(AliasError::AlreadyExists(alias.to_string()));
        }

        // Walk the chain the new entry would create before committing it.
        let mut candidate = self.clone();
        candidate
            .entries
            .insert(alias.to_string(), target.to_string());
        if candidate.resolve(alias).is_err() {
            return Err(AliasError::CycleOrDepth(alias.to_string()));
        }

        self.entries
            .insert(alias.to_string(), target.to_string());
        Ok(())
    }

    pub fn remove(&mut self, alias: &str) -> Result<String, AliasError> {
        self.entries
            .remove(alias)
            .ok_or_else(|| AliasError::NotFound(alias.to_string()))
    }

    /// Drops every entry whose target is `target`; returns the removed aliases.
    pub fn remove_targeting(&mut self, target: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, t)| t.as_str() == target)
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in &removed {
            self.entries.remove(alias);
        }
        removed
    }

    /// Follows redirections from `name` until a terminal target.
    ///
    /// Refuses revisits and chains longer than [`ALIAS_RESOLVE_LIMIT`]; a name
    /// that is not aliased resolves to itself in zero steps.
    pub fn resolve(&self, name: &str) -> Result<String, AliasError> {
        let mut current = name.to_string();
        let mut visited = BTreeSet::new();
        let mut steps = 0usize;
        while let Some(next) = self.entries.get(&current) {
            if !visited.insert(current.clone()) {
                return Err(AliasError::CycleOrDepth(name.to_string()));
            }
            steps += 1;
            if steps > ALIAS_RESOLVE_LIMIT {
                return Err(AliasError::CycleOrDepth(name.to_string()));
            }
            current = next.clone();
        }
        Ok(current)
    }
}
