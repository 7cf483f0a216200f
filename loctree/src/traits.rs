//! Traits shared by the file formats of the pipeline.

use std::{
    fs::File,
    io::{BufRead, BufReader, Cursor, Write},
    path::Path,
};

use crate::{error::Error, fsutil};

/// A document that can be read from and written to one file.
///
/// # Example
///
/// ```rust,no_run
/// use loctree::{formats::po::Catalog, traits::Parser};
/// let catalog = Catalog::read_from("ru.po")?;
/// catalog.write_to("ru_copy.po")?;
/// Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub trait Parser {
    /// Parse from any reader.
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error>
    where
        Self: Sized;

    /// Parse from file path.
    fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, Error>
    where
        Self: Sized,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(path, "read"),
            _ => Error::Io(e),
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Write to any writer (file, memory, etc.).
    fn to_writer<W: Write>(&self, writer: W) -> Result<(), Error>;

    /// Write to file path. The file is replaced atomically.
    fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let mut buf = Vec::new();
        self.to_writer(&mut buf)?;
        fsutil::write_atomic(path, &buf).map_err(|source| Error::WriteFailure {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse from a string.
    fn from_str(s: &str) -> Result<Self, Error>
    where
        Self: Sized,
    {
        Self::from_reader(Cursor::new(s))
    }
}
