use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod content;
pub mod error;
pub mod olc;
pub mod registry;
pub mod world;
pub mod zone;

pub use content::{
    load_world, save_zone, ContentCompileError, ContentErrorCode, LoadedWorld, SaveReport,
    SourceLocation, WorldLoadError, WorldSaveError, ZoneFileError, ZoneFileErrorCode,
};
pub use error::OlcError;
pub use olc::{CommitOutcome, FixupReport, SessionId, WorldService, WorldSnapshot};
pub use registry::{ProtoHandle, ProtoKind, PrototypeRegistry, PrototypeStore, Vnum};
pub use world::{CommandDispatcher, LiveWorld, QueuedDispatcher, ShopTable, SimWorld};
pub use zone::{ResetEngine, ResetReport, ResetScript, ZoneScheduler, ZoneTable};

pub const ROOT_ENV_VAR: &str = "ZONE_ENGINE_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root: PathBuf,
    /// Holds `mob/`, `obj/`, `wld/`, `shp/` and `zon/`.
    pub world_dir: PathBuf,
}

impl AppPaths {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let world_dir = root.join("assets").join("world");
        Self { root, world_dir }
    }

    fn has_world(&self) -> bool {
        self.world_dir.is_dir()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("{env_var} points at {root}, but {world_dir} is not a directory")]
    InvalidEnvRoot {
        root: PathBuf,
        world_dir: PathBuf,
        env_var: &'static str,
    },
    #[error(
        "no directory at or above {start_dir} contains assets/world\n\
Set {env_var} to the project root, for example:\n\
export {env_var}=\"/path/to/zone-engine\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

/// Uses `ZONE_ENGINE_ROOT` when set; otherwise takes the nearest ancestor of
/// the executable that has an `assets/world` directory.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    if let Some(value) = env::var_os(ROOT_ENV_VAR) {
        return paths_from_env_root(Path::new(&value));
    }
    let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
    let exe_dir = exe
        .parent()
        .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
    find_root_upward(exe_dir)
}

fn paths_from_env_root(root: &Path) -> Result<AppPaths, StartupError> {
    let paths = AppPaths::from_root(canonical(root));
    if paths.has_world() {
        Ok(paths)
    } else {
        Err(StartupError::InvalidEnvRoot {
            root: paths.root,
            world_dir: paths.world_dir,
            env_var: ROOT_ENV_VAR,
        })
    }
}

fn find_root_upward(start_dir: &Path) -> Result<AppPaths, StartupError> {
    start_dir
        .ancestors()
        .map(AppPaths::from_root)
        .find(AppPaths::has_world)
        .map(|paths| AppPaths::from_root(canonical(&paths.root)))
        .ok_or_else(|| StartupError::RootNotFound {
            start_dir: canonical(start_dir),
            env_var: ROOT_ENV_VAR,
        })
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn nearest_ancestor_with_a_world_is_the_root() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir_all(temp.path().join("assets").join("world")).expect("world");
        let bin_dir = temp.path().join("target").join("debug");
        fs::create_dir_all(&bin_dir).expect("bin dir");

        let paths = find_root_upward(&bin_dir).expect("root");
        assert_eq!(paths.root, canonical(temp.path()));
        assert!(paths.world_dir.ends_with("assets/world"));
    }

    #[test]
    fn env_root_without_world_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let err = paths_from_env_root(temp.path()).expect_err("no world");
        assert!(matches!(err, StartupError::InvalidEnvRoot { .. }));

        fs::create_dir_all(temp.path().join("assets").join("world")).expect("world");
        assert!(paths_from_env_root(temp.path()).is_ok());
    }
}
