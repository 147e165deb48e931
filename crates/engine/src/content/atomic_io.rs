use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes `<name>.new` next to the target and renames it over the target, so
/// readers see either the old file or the complete new one.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    if let Err(error) = fs::write(&tmp_path, text.as_bytes()) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    replace_file(&tmp_path, path)
}

fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    match fs::rename(tmp_path, final_path) {
        Ok(()) => Ok(()),
        // Some platforms refuse to rename over an existing file.
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
            fs::remove_file(final_path)?;
            fs::rename(tmp_path, final_path).inspect_err(|_| {
                let _ = fs::remove_file(tmp_path);
            })
        }
        Err(error) => {
            let _ = fs::remove_file(tmp_path);
            Err(error)
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("world");
    let tmp_name = format!("{file_name}.new");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replaces_existing_file_and_leaves_no_temp() {
        let temp = TempDir::new().expect("temp");
        let target = temp.path().join("zon").join("30.zon");

        write_text_atomic(&target, "first").expect("first write");
        write_text_atomic(&target, "second").expect("second write");

        assert_eq!(fs::read_to_string(&target).expect("read"), "second");
        assert!(!temp_path_for(&target).exists());
    }
}
