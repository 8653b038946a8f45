// archive.rs - zip container access for material archives
use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::error::{Result, ViewerError};

/// Largest inflated entry accepted from a container.
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Upper bound on the buffer reserved from an entry's declared size.
const PREALLOCATE_LIMIT: u64 = 16 * 1024 * 1024;

/// Decoded contents of a material archive.
///
/// Every file entry is inflated eagerly, so the parser never touches the
/// container itself. Paths are stored forward-slash normalised and keep the
/// order in which they appear in the container.
#[derive(Debug, Default, Clone)]
pub struct ArchiveContents {
    entries: Vec<(String, Vec<u8>)>,
    lookup: HashMap<String, usize>,
}

impl ArchiveContents {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_limit(bytes, MAX_ENTRY_BYTES)
    }

    /// Decodes a container, rejecting any entry that inflates past `limit` bytes.
    pub fn from_bytes_with_limit(bytes: &[u8], limit: u64) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
            ViewerError::ArchiveCorrupt {
                reason: err.to_string(),
            }
        })?;

        let mut contents = Self::default();
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|err| ViewerError::ArchiveCorrupt {
                    reason: format!("entry {index}: {err}"),
                })?;

            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            // The declared size comes from the container and is not trusted.
            let reserve = file.size().min(limit).min(PREALLOCATE_LIMIT);
            let mut data = Vec::with_capacity(reserve as usize);
            (&mut file)
                .take(limit.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|err| ViewerError::ArchiveCorrupt {
                    reason: format!("failed to inflate '{name}': {err}"),
                })?;

            if data.len() as u64 > limit {
                return Err(ViewerError::ArchiveCorrupt {
                    reason: format!("entry '{name}' inflates past {limit} bytes"),
                });
            }

            contents.insert(&name, data);
        }

        log::debug!("Decoded archive with {} entries", contents.len());
        Ok(contents)
    }

    /// Builds contents from already-decoded entries. Later duplicates replace
    /// earlier ones but keep the original position.
    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, Vec<u8>)>,
        P: AsRef<str>,
    {
        let mut contents = Self::default();
        for (path, data) in entries {
            contents.insert(path.as_ref(), data);
        }
        contents
    }

    fn insert(&mut self, raw_path: &str, data: Vec<u8>) {
        let path = normalize_entry_path(raw_path);
        match self.lookup.get(&path) {
            Some(&index) => self.entries[index].1 = data,
            None => {
                self.lookup.insert(path.clone(), self.entries.len());
                self.entries.push((path, data));
            }
        }
    }

    pub fn entry(&self, path: &str) -> Option<&[u8]> {
        let path = normalize_entry_path(path);
        self.lookup
            .get(&path)
            .map(|&index| self.entries[index].1.as_slice())
    }

    /// Like [`entry`](Self::entry) but a missing path is an error.
    pub fn require(&self, path: &str) -> Result<&[u8]> {
        self.entry(path).ok_or_else(|| ViewerError::EntryMissing {
            path: normalize_entry_path(path),
        })
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalises an archive path: back-slashes become `/`, leading `./` and `/` are dropped.
pub fn normalize_entry_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");

    loop {
        if let Some(stripped) = normalized.strip_prefix("./") {
            normalized = stripped.to_string();
        } else if let Some(stripped) = normalized.strip_prefix('/') {
            normalized = stripped.to_string();
        } else {
            break;
        }
    }

    normalized
}

/// True when the (normalised) path has no directory component.
pub fn is_root_entry(path: &str) -> bool {
    !normalize_entry_path(path).contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn backslash_paths_are_normalized() {
        assert_eq!(normalize_entry_path("tex\\albedo.png"), "tex/albedo.png");
        assert_eq!(normalize_entry_path("./a/b.png"), "a/b.png");
        assert_eq!(normalize_entry_path("/root.png"), "root.png");
    }

    #[test]
    fn decodes_entries_in_container_order() {
        let bytes = zip_bytes(&[("b.u3m", b"{}"), ("a\\tex.png", b"png")]);
        let contents = ArchiveContents::from_bytes(&bytes).unwrap();

        let paths: Vec<_> = contents.paths().collect();
        assert_eq!(paths, vec!["b.u3m", "a/tex.png"]);
        assert_eq!(contents.entry("a/tex.png"), Some(&b"png"[..]));
        assert_eq!(contents.entry("a\\tex.png"), Some(&b"png"[..]));
    }

    #[test]
    fn garbage_is_archive_corrupt() {
        let err = ArchiveContents::from_bytes(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ViewerError::ArchiveCorrupt { .. }));
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let bytes = zip_bytes(&[("small.png", b"1234"), ("big.png", &[7u8; 64])]);

        let err = ArchiveContents::from_bytes_with_limit(&bytes, 16).unwrap_err();
        assert!(matches!(err, ViewerError::ArchiveCorrupt { reason } if reason.contains("big.png")));

        let contents = ArchiveContents::from_bytes_with_limit(&bytes, 64).unwrap();
        assert_eq!(contents.entry("big.png").map(<[u8]>::len), Some(64));
    }

    #[test]
    fn require_reports_missing_entry() {
        let contents = ArchiveContents::from_entries([("x.png", vec![1u8])]);
        let err = contents.require("tex\\y.png").unwrap_err();
        assert_eq!(
            err,
            ViewerError::EntryMissing {
                path: "tex/y.png".into()
            }
        );
    }

    #[test]
    fn root_entry_detection() {
        assert!(is_root_entry("preview.png"));
        assert!(!is_root_entry("sub/preview.png"));
        assert!(!is_root_entry("sub\\preview.png"));
    }
}
