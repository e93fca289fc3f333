use crate::error::{IndexError, Result};
use crate::index::{DocId, Segment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, create_dir_all, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    /// Bumped on every commit; names the next segment file.
    pub generation: u64,
    pub created_at: String,
    pub updated_at: String,
    pub segments: Vec<SegmentMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: String,
    pub num_docs: u32,
    #[serde(default)]
    pub deleted: BTreeSet<DocId>,
}

impl SegmentMeta {
    pub fn live_docs(&self) -> u32 {
        self.num_docs.saturating_sub(self.deleted.len() as u32)
    }
}

impl MetaFile {
    pub fn empty() -> Self {
        let now = now_rfc3339();
        Self { version: FORMAT_VERSION, generation: 0, created_at: now.clone(), updated_at: now, segments: Vec::new() }
    }

    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_docs() as u64).sum()
    }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into())
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn segment(&self, name: &str) -> PathBuf { self.root.join(format!("{name}.bin")) }
    fn tmp(&self, file_name: &str) -> PathBuf { self.root.join(format!(".{file_name}.tmp")) }
}

pub fn segment_name(generation: u64) -> String {
    format!("seg_{generation:010}")
}

/// Write to a temporary sibling, fsync, then rename over the target.
fn write_atomic(paths: &IndexPaths, target: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = target.file_name().and_then(|n| n.to_str()).unwrap_or("index");
    let tmp = paths.tmp(file_name);
    let io = || -> io::Result<()> {
        create_dir_all(&paths.root)?;
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, target)
    };
    io().map_err(|e| IndexError::unavailable(target, e))
}

fn read_bytes(path: &Path) -> io::Result<Vec<u8>> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Load the commit point; a missing directory or meta file is an empty index.
pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let buf = match read_bytes(&path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MetaFile::empty()),
        Err(e) => return Err(IndexError::unavailable(&path, e)),
    };
    let meta: MetaFile = serde_json::from_slice(&buf).map_err(|e| IndexError::corrupt(&path, e))?;
    if meta.version != FORMAT_VERSION {
        return Err(IndexError::corrupt(&path, format!("unsupported index format version {}", meta.version)));
    }
    for segment in &meta.segments {
        if let Some(doc_id) = segment.deleted.iter().find(|d| **d >= segment.num_docs) {
            return Err(IndexError::corrupt(
                &path,
                format!("segment {} deletes document {doc_id} of {}", segment.name, segment.num_docs),
            ));
        }
    }
    Ok(meta)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let path = paths.meta();
    let json = serde_json::to_vec_pretty(meta).map_err(|e| IndexError::corrupt(&path, e))?;
    write_atomic(paths, &path, &json)
}

pub fn save_segment(paths: &IndexPaths, name: &str, segment: &Segment) -> Result<()> {
    let path = paths.segment(name);
    let bytes = bincode::serialize(segment).map_err(|e| IndexError::corrupt(&path, e))?;
    write_atomic(paths, &path, &bytes)
}

/// Raw I/O errors are returned untouched so readers can tell a segment removed by a
/// concurrent merge (`NotFound`) from a real failure.
pub fn load_segment(paths: &IndexPaths, name: &str) -> std::result::Result<Segment, io::Error> {
    let buf = read_bytes(&paths.segment(name))?;
    bincode::deserialize(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Remove segment files that the given commit point no longer references.
pub fn remove_unreferenced(paths: &IndexPaths, meta: &MetaFile) -> io::Result<Vec<String>> {
    let mut removed = Vec::new();
    let entries = match fs::read_dir(&paths.root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(".bin")) else { continue };
        if name.starts_with("seg_") && !meta.segments.iter().any(|s| s.name == name) {
            fs::remove_file(entry.path())?;
            removed.push(name.to_string());
        }
    }
    Ok(removed)
}

/// Delete everything inside the index directory and leave it empty.
pub fn clean_directory(paths: &IndexPaths) -> Result<()> {
    let io = || -> io::Result<()> {
        match fs::remove_dir_all(&paths.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        create_dir_all(&paths.root)
    };
    io().map_err(|e| IndexError::unavailable(&paths.root, e))
}
