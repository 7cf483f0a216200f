//! Filesystem helpers: encoding-aware reads, atomic writes, tree copies.

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Byte encoding of a text file, recognized by its BOM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    /// Encoding announced by the BOM at the start of `bytes`; plain UTF-8
    /// without one.
    pub fn detect(bytes: &[u8]) -> Self {
        match encoding_rs::Encoding::for_bom(bytes) {
            Some((enc, _)) if enc == encoding_rs::UTF_16LE => TextEncoding::Utf16Le,
            Some((enc, _)) if enc == encoding_rs::UTF_16BE => TextEncoding::Utf16Be,
            Some(_) => TextEncoding::Utf8Bom,
            None => TextEncoding::Utf8,
        }
    }

    pub fn is_utf8(&self) -> bool {
        *self == TextEncoding::Utf8
    }

    /// Encodes `text`, BOM included.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf8Bom => {
                let mut out = Vec::with_capacity(text.len() + 3);
                out.extend_from_slice(b"\xEF\xBB\xBF");
                out.extend_from_slice(text.as_bytes());
                out
            }
            TextEncoding::Utf16Le => {
                let mut out = vec![0xFF, 0xFE];
                out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
                out
            }
            TextEncoding::Utf16Be => {
                let mut out = vec![0xFE, 0xFF];
                out.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
                out
            }
        }
    }
}

/// Decoded file content together with the encoding it was stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFile {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Reads a text file, decoding UTF-16 and stripping a UTF-8 BOM. The
/// detected encoding is returned so the file can be written back unchanged.
pub fn read_text_file(path: &Path) -> io::Result<TextFile> {
    let bytes = fs::read(path)?;
    let encoding = TextEncoding::detect(&bytes);
    let mut decoder = encoding_rs_io::DecodeReaderBytesBuilder::new()
        .bom_override(true)
        .build(bytes.as_slice());
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(TextFile { text, encoding })
}

/// Reads a text file, decoding UTF-16 and stripping a UTF-8 BOM.
pub fn read_text(path: &Path) -> io::Result<String> {
    read_text_file(path).map(|file| file.text)
}

/// Resolves a `/`-separated relative path from untrusted input. `.` and
/// empty segments are dropped; `None` when the path is absolute or climbs
/// out with `..`.
pub fn safe_rel(rel: &str) -> Option<String> {
    let rel = rel.replace('\\', "/");
    if rel.starts_with('/') {
        return None;
    }
    let mut parts = Vec::new();
    for component in Path::new(&rel).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() || parts.iter().any(|p| p.contains(':')) {
        return None;
    }
    Some(parts.join("/"))
}

/// Writes `contents` next to `path` and renames it into place, so readers
/// never observe a truncated file. Parent directories are created.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Recursively copies `src` into `dst`. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut copied = 0;
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// `path` relative to `root`, with `/` separators on every platform.
pub fn rel_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// True for files the pipeline treats as data: `*.xml`, any case.
pub fn is_xml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
}

/// Sorted `*.xml` files below `dir`. A missing directory yields nothing.
pub fn xml_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!("skipping unreadable entry under {}: {err}", dir.display());
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_xml_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
