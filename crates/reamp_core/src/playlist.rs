//! Playlist
//!
//! An append-only list of tracks plus the index of the one currently
//! selected. The cursor is either `None` or a valid index.

use std::path::{Path, PathBuf};

/// A user-supplied audio file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    path: PathBuf,
    name: String,
}

impl Track {
    /// Track named after its file name
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Playable reference for the transport (`file://` URI)
    pub fn url(&self) -> String {
        let absolute = if self.path.is_absolute() {
            self.path.clone()
        } else {
            std::env::current_dir()
                .map(|dir| dir.join(&self.path))
                .unwrap_or_else(|_| self.path.clone())
        };
        format!("file://{}", absolute.to_string_lossy())
    }
}

#[derive(Debug, Default, Clone)]
pub struct Playlist {
    tracks: Vec<Track>,
    current: Option<usize>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append tracks; returns how many were added
    pub fn extend<I: IntoIterator<Item = Track>>(&mut self, tracks: I) -> usize {
        let before = self.tracks.len();
        self.tracks.extend(tracks);
        self.tracks.len() - before
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Index of the selected track
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Select a track; out-of-range indices are refused
    pub fn select(&mut self, index: usize) -> Option<&Track> {
        if index >= self.tracks.len() {
            return None;
        }
        self.current = Some(index);
        self.tracks.get(index)
    }

    /// Index after the current one, if there is one
    pub fn next_index(&self) -> Option<usize> {
        self.current
            .map(|i| i + 1)
            .filter(|&i| i < self.tracks.len())
    }

    /// Index before the current one, if there is one
    pub fn prev_index(&self) -> Option<usize> {
        self.current.and_then(|i| i.checked_sub(1))
    }
}
