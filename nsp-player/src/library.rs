//! Audio library browsing
//!
//! The library is a plain folder tree. Custom mode lists one folder at a
//! time (sub-directories first, then playable files, then anything the
//! decoder cannot handle, marked and not selectable) and the operator picks
//! entries by index. Test mode looks up one numbered identification clip
//! per device in `<library>/test/`.

use crate::audio::is_supported_audio_file;
use crate::error::{Error, Result};
use crate::plan::DeviceId;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sub-folder holding the test-mode signals
pub const TEST_FOLDER: &str = "test";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Audio,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Contents of one library folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub dir: PathBuf,
    /// Directories then audio files, each sorted by name; indices refer here
    pub selectable: Vec<LibraryEntry>,
    /// Files the decoder does not support
    pub unsupported: Vec<LibraryEntry>,
}

/// Fail with `DirectoryNotFound` unless `path` is an existing directory.
pub fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::DirectoryNotFound(path.to_path_buf()))
    }
}

/// List one folder of the library.
pub fn list_directory(dir: &Path) -> Result<Listing> {
    require_dir(dir)?;

    let mut dirs = Vec::new();
    let mut audio = Vec::new();
    let mut unsupported = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        let kind = if path.is_dir() {
            EntryKind::Directory
        } else if is_supported_audio_file(&path) {
            EntryKind::Audio
        } else {
            EntryKind::Unsupported
        };

        let item = LibraryEntry { name, path, kind };
        match kind {
            EntryKind::Directory => dirs.push(item),
            EntryKind::Audio => audio.push(item),
            EntryKind::Unsupported => unsupported.push(item),
        }
    }

    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    audio.sort_by(|a, b| a.name.cmp(&b.name));
    unsupported.sort_by(|a, b| a.name.cmp(&b.name));
    dirs.extend(audio);

    debug!(
        "Listed {}: {} selectable, {} unsupported",
        dir.display(),
        dirs.len(),
        unsupported.len()
    );

    Ok(Listing {
        dir: dir.to_path_buf(),
        selectable: dirs,
        unsupported,
    })
}

/// Operator-facing rendering of a listing
pub fn format_listing(listing: &Listing) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "current directory: '{}'", listing.dir.display());
    let _ = writeln!(out);

    for (index, entry) in listing.selectable.iter().enumerate() {
        let label = format!("[{}] - {}", index, entry.name);
        let note = match entry.kind {
            EntryKind::Directory => "(sub-directory)",
            _ => "(audio file)",
        };
        let _ = writeln!(out, "{:<40}{}", label, note);
    }
    for entry in &listing.unsupported {
        let label = format!("[*] - {}", entry.name);
        let _ = writeln!(out, "{:<40}[UNSUPPORTED FORMAT]", label);
    }
    out
}

/// Parse space-separated indices into the entries they name, in the order
/// written. Repeats are allowed.
///
/// # Errors
/// `Error::InvalidSelection` for empty input, a non-numeric token, or an
/// index past the end of the listing.
pub fn parse_selection(input: &str, listing: &Listing) -> Result<Vec<LibraryEntry>> {
    let mut chosen = Vec::new();

    for token in input.split_whitespace() {
        let index: usize = token
            .parse()
            .map_err(|_| Error::InvalidSelection(format!("'{}' is not an index", token)))?;
        let entry = listing.selectable.get(index).ok_or_else(|| {
            Error::InvalidSelection(format!(
                "index {} out of range (0-{})",
                index,
                listing.selectable.len().saturating_sub(1)
            ))
        })?;
        chosen.push(entry.clone());
    }

    if chosen.is_empty() {
        return Err(Error::InvalidSelection("nothing selected".to_string()));
    }
    Ok(chosen)
}

/// Interactive selection starting at `dir`.
///
/// Selecting a directory descends into it and its picks are inserted at
/// that point. Invalid input re-prompts the same folder. End of input
/// returns whatever has been picked so far.
pub fn select_interactively<R: BufRead, W: Write>(
    dir: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<Vec<PathBuf>> {
    let listing = list_directory(dir)?;

    loop {
        writeln!(
            output,
            "\nSelect audio by index. Several indices separated by spaces play in order.\n"
        )?;
        write!(output, "{}", format_listing(&listing))?;
        write!(output, "\nDesired input audio: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Vec::new());
        }

        match parse_selection(&line, &listing) {
            Ok(entries) => {
                let mut files = Vec::new();
                for entry in entries {
                    match entry.kind {
                        EntryKind::Directory => {
                            files.extend(select_interactively(&entry.path, input, output)?)
                        }
                        _ => files.push(entry.path),
                    }
                }
                return Ok(files);
            }
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}

/// Identification clips for test mode.
///
/// The device at position `i` of `devices` (0-based) is identified by
/// `<library>/test/<i+1>.<ext>`, for any supported extension; when several
/// match, the first by name wins. Devices without a clip are absent from the
/// map.
///
/// # Errors
/// `Error::DirectoryNotFound` when the library or its test folder is missing.
pub fn identification_clips(library: &Path, devices: &[DeviceId]) -> Result<HashMap<DeviceId, PathBuf>> {
    require_dir(library)?;
    let listing = list_directory(&library.join(TEST_FOLDER))?;

    let mut clips = HashMap::new();
    for (position, &device) in devices.iter().enumerate() {
        let stem = (position + 1).to_string();
        let clip = listing
            .selectable
            .iter()
            .filter(|e| e.kind == EntryKind::Audio)
            .find(|e| e.path.file_stem().is_some_and(|s| s.to_string_lossy() == stem.as_str()));

        match clip {
            Some(entry) => {
                clips.entry(device).or_insert_with(|| entry.path.clone());
            }
            None => debug!("No identification clip {}.* for device {}", stem, device),
        }
    }
    Ok(clips)
}
