use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Replace anything outside `[A-Za-z0-9._-]` so the name is safe on every
/// filesystem we move files across.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "document.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Replace `path` with `bytes` via a temp file in the same directory, so
/// readers never observe a half-written file.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Copy a processed source into `archive_dir/<hash>.pdf` and return that path.
pub fn archive_source(source: &Path, archive_dir: &Path, hash: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(archive_dir)?;
    let target = archive_dir.join(format!("{hash}.pdf"));
    if source != target {
        std::fs::copy(source, &target)?;
    }
    tracing::debug!(source = %source.display(), target = %target.display(), "Source archived");
    Ok(target)
}

/// Move `source` into `dir`, never overwriting an existing file there.
/// Falls back to copy + remove across filesystems.
pub fn move_into(source: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = source
        .file_name()
        .map(|n| sanitize_filename(&n.to_string_lossy()))
        .unwrap_or_else(|| "document.pdf".to_string());
    let target = unique_target(dir, &name);

    if std::fs::rename(source, &target).is_err() {
        std::fs::copy(source, &target)?;
        std::fs::remove_file(source)?;
    }
    tracing::debug!(source = %source.display(), target = %target.display(), "File moved");
    Ok(target)
}

/// Whether `path` sits directly inside `dir`.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    path.parent().is_some_and(|parent| parent == dir)
}

fn unique_target(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    (1..)
        .map(|n| dir.join(format!("{stem}_{stamp}_{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("DDT 12/2024 (copia).pdf"), "DDT_12_2024_copia_.pdf");
        assert_eq!(sanitize_filename("  ../../etc  "), ".._.._etc");
        assert_eq!(sanitize_filename("???"), "document.pdf");
        assert_eq!(sanitize_filename("ok-name_1.pdf"), "ok-name_1.pdf");
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        // No temp files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn archive_copies_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();

        let archived = archive_source(&source, &dir.path().join("archive"), "abc").unwrap();
        assert!(archived.ends_with("archive/abc.pdf"));
        assert!(source.exists());
        assert_eq!(std::fs::read(archived).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn move_into_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let quarantine = dir.path().join("quarantine");
        for body in [&b"one"[..], &b"two"[..]] {
            let source = dir.path().join("bad.pdf");
            std::fs::write(&source, body).unwrap();
            let moved = move_into(&source, &quarantine).unwrap();
            assert!(!source.exists());
            assert_eq!(std::fs::read(&moved).unwrap(), body);
        }
        assert_eq!(std::fs::read_dir(&quarantine).unwrap().count(), 2);
    }

    #[test]
    fn within_checks_direct_parent() {
        assert!(is_within(Path::new("/data/inbox/a.pdf"), Path::new("/data/inbox")));
        assert!(!is_within(Path::new("/data/inbox/sub/a.pdf"), Path::new("/data/inbox")));
        assert!(!is_within(Path::new("/home/user/a.pdf"), Path::new("/data/inbox")));
    }
}
