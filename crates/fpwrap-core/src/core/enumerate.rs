use anyhow::Result;

use fpwrap_domain::ApplicationId;

use crate::core::runtime::effects::{PlatformCli, PlatformScope};
use crate::tooling::errors::EngineError;

/// Lists every installed application across the per-user and system scopes.
///
/// The two scope listings are unioned, filtered down to rows whose leading
/// token is id-shaped (header and decoration lines fall out here), sorted and
/// deduplicated. Both scopes failing — or the platform binary being absent —
/// raises [`EngineError::PlatformUnavailable`].
pub fn list_installed(platform: &dyn PlatformCli) -> Result<Vec<ApplicationId>> {
    if platform.locate().is_none() {
        return Err(
            EngineError::PlatformUnavailable("flatpak is not on the search path".into()).into(),
        );
    }

    let mut ids = Vec::new();
    let mut failures = Vec::new();
    for scope in [PlatformScope::User, PlatformScope::System] {
        match platform.list_apps(scope) {
            Ok(output) if output.success() => {
                ids.extend(parse_rows(&output.stdout));
            }
            Ok(output) => {
                failures.push(format!(
                    "{} listing failed with code {}: {}",
                    scope.flag(),
                    output.code,
                    output.stderr.trim()
                ));
            }
            Err(err) => failures.push(format!("{} listing failed: {err}", scope.flag())),
        }
    }

    if failures.len() == 2 {
        return Err(EngineError::PlatformUnavailable(failures.join("; ")).into());
    }
    for failure in &failures {
        tracing::warn!(%failure, "one platform scope was unavailable");
    }

    ids.sort();
    ids.dedup();
    Ok(ids)
}

fn parse_rows(stdout: &str) -> Vec<ApplicationId> {
    stdout
        .lines()
        .filter_map(|line| {
            let token = line.split_whitespace().next()?;
            ApplicationId::parse(token).ok()
        })
        .collect()
}
