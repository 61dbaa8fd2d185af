use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const TMP_MARKER: &str = ".tmp.";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `dest` through a uniquely named sibling temp file and a rename, so a
/// reader never observes a partially written file.
pub(crate) fn atomic_write_with(
    dest: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(dest, parent)?;
    let written = write(&mut file).and_then(|()| file.sync_all());
    drop(file);

    if let Err(err) = written.and_then(|()| fs::rename(&tmp_path, dest)) {
        remove_file_best_effort(&tmp_path, "atomic_write.cleanup");
        return Err(err);
    }
    Ok(())
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!("{TMP_MARKER}{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new().write(true).create_new(true).open(&tmp_path) {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn is_tmp_file(name: &str) -> bool {
    name.contains(TMP_MARKER)
}

/// Deletes temp files left behind by an interrupted write. Returns how many were removed.
pub(crate) fn remove_stale_tmp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_stale = entry.file_type()?.is_file() && entry.file_name().to_str().is_some_and(is_tmp_file);
        if is_stale && remove_file_best_effort(&entry.path(), "stale_tmp") {
            removed += 1;
        }
    }
    Ok(removed)
}

pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target = "verifier.repository",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove file"
            );
            false
        }
    }
}
