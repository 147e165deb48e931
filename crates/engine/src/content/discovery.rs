use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Subdirectories of the world directory that hold `<Defs>` documents.
pub const DEF_DIRS: [&str; 4] = ["mob", "obj", "wld", "shp"];
pub const ZONE_DIR: &str = "zon";
pub const ZONE_EXTENSION: &str = "zon";

#[derive(Debug)]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub source: io::Error,
}

/// Files that make up a world, each list in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldSources {
    pub def_files: Vec<PathBuf>,
    pub zone_files: Vec<PathBuf>,
}

pub fn discover_world_sources(world_dir: &Path) -> Result<WorldSources, DiscoveryError> {
    if !world_dir.is_dir() {
        return Err(DiscoveryError {
            path: world_dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "world directory not found"),
        });
    }

    let mut sources = WorldSources::default();
    for dir in DEF_DIRS {
        sources
            .def_files
            .extend(collect_sorted(&world_dir.join(dir), "xml")?);
    }
    sources.zone_files = collect_sorted(&world_dir.join(ZONE_DIR), ZONE_EXTENSION)?;
    Ok(sources)
}

/// A missing directory counts as empty.
fn collect_sorted(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(dir, extension, &mut files)?;
    files.sort_by_key(|path| normalize_rel_path(path.strip_prefix(dir).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(
    current: &Path,
    extension: &str,
    files: &mut Vec<PathBuf>,
) -> Result<(), DiscoveryError> {
    let entries = fs::read_dir(current).map_err(|source| DiscoveryError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, extension, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, "").expect("write");
    }

    #[test]
    fn defs_follow_directory_order_then_name() {
        let temp = TempDir::new().expect("tempdir");
        let world = temp.path();
        touch(&world.join("wld").join("30.xml"));
        touch(&world.join("mob").join("31.xml"));
        touch(&world.join("mob").join("30.xml"));
        touch(&world.join("mob").join("notes.txt"));
        touch(&world.join("zon").join("31.zon"));
        touch(&world.join("zon").join("30.zon"));

        let sources = discover_world_sources(world).expect("discover");
        let names = sources
            .def_files
            .iter()
            .map(|path| normalize_rel_path(path.strip_prefix(world).expect("under world")))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["mob/30.xml", "mob/31.xml", "wld/30.xml"]);
        assert_eq!(sources.zone_files.len(), 2);
        assert!(sources.zone_files[0].ends_with("30.zon"));
    }

    #[test]
    fn missing_world_dir_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let err = discover_world_sources(&temp.path().join("nope")).expect_err("missing");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }
}
