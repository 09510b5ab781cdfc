//! Capability-based filesystem helpers for reading inputs and replacing
//! output containers, built on `cap-std` and `camino`.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, Read};
use std::path::Component;

/// Suffix appended to an output file name while it is being written.
pub const STAGING_SUFFIX: &str = ".partial";

/// Open the directory containing `path` and return it with the file name.
///
/// # Errors
/// Fails when `path` has no file name or the parent cannot be opened.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Whether `path` exists and is a regular file.
///
/// A missing file or parent directory yields `Ok(false)`.
///
/// # Errors
/// Propagates I/O errors other than `NotFound`.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(found) => found,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.metadata(name.as_str()) {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Read a UTF-8 text file.
///
/// # Errors
/// Propagates open and read failures, including invalid UTF-8.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let mut file = fs_utf8::File::open_ambient(path, ambient_authority())?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Create every missing directory above `path`.
///
/// # Errors
/// Propagates directory creation failures.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }
    let (base, relative) = split_ambient_base(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    base.create_dir_all(&relative)
}

/// Remove the file at `path`, returning whether anything was deleted.
///
/// # Errors
/// Propagates failures other than the file or its directory being absent.
pub fn remove_file_if_exists(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(found) => found,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.remove_file(name.as_str()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Path of the scratch file written before `path` is replaced.
///
/// ```
/// use camino::Utf8Path;
///
/// let staging = supertiles_fs::staging_path(Utf8Path::new("out/places.mbtiles"));
/// assert_eq!(staging, "out/places.mbtiles.partial");
/// ```
#[must_use]
pub fn staging_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut staged = path.as_str().to_owned();
    staged.push_str(STAGING_SUFFIX);
    Utf8PathBuf::from(staged)
}

/// Atomically move `from` onto `to`; both must share a directory.
///
/// # Errors
/// Propagates the rename failure.
pub fn persist(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    let (dir, from_name) = open_dir_and_file(from)?;
    let (_, to_name) = open_dir_and_file(to)?;
    dir.rename(from_name.as_str(), &dir, to_name.as_str())
}

/// Split `parent` into an ambient root (`/`, a drive prefix or `.`) and the
/// remaining relative path, so directories can be created through cap-std.
fn split_ambient_base(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();
    let (base, relative) = match std_parent.components().next() {
        Some(Component::Prefix(prefix)) => {
            let prefix = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            let base = Utf8PathBuf::from(prefix).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = parent
                .strip_prefix(&base)
                .or_else(|_| parent.strip_prefix(prefix))
                .map_err(|_| io::Error::other(format!("cannot strip {prefix} from {parent}")))?
                .to_owned();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = parent
                .strip_prefix(&base)
                .map_err(|_| io::Error::other(format!("cannot strip root from {parent}")))?
                .to_owned();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), parent.to_owned()),
    };
    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    Ok((dir, relative))
}
