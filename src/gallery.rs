//! Uploaded images, their preview handles, and the selection state.

use crate::error::{EditError, Result};
use crate::image::{EditedImage, UploadedImage};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A preview file for an uploaded image.
///
/// Handles are not `Clone`: each one has a single owner and is given back to
/// [`DisplayHandles::release`] exactly once.
#[derive(Debug)]
#[must_use = "display handles must be released"]
pub struct DisplayHandle {
    id: u64,
    path: PathBuf,
}

impl DisplayHandle {
    /// Location of the preview file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A URI a viewer can open.
    pub fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Issues and releases [`DisplayHandle`]s backed by files in a private
/// temporary directory.
#[derive(Debug)]
pub struct DisplayHandles {
    dir: tempfile::TempDir,
    next_id: u64,
    live: HashSet<u64>,
    released: u64,
}

impl DisplayHandles {
    /// Creates an empty registry.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("gemedit-preview-").tempdir()?;
        Ok(Self {
            dir,
            next_id: 0,
            live: HashSet::new(),
            released: 0,
        })
    }

    /// Writes `image` to a new preview file.
    pub fn create(&mut self, image: &UploadedImage) -> Result<DisplayHandle> {
        let id = self.next_id;
        self.next_id += 1;
        let path = self
            .dir
            .path()
            .join(format!("{id:04}.{}", image.format.extension()));
        std::fs::write(&path, &image.data)?;
        self.live.insert(id);
        Ok(DisplayHandle { id, path })
    }

    /// Deletes the preview file behind `handle`.
    pub fn release(&mut self, handle: DisplayHandle) -> Result<()> {
        if !self.live.remove(&handle.id) {
            return Err(EditError::InvalidRequest(format!(
                "display handle {} does not belong to this gallery",
                handle.id
            )));
        }
        self.released += 1;
        match std::fs::remove_file(&handle.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of handles issued and not yet released.
    pub fn live(&self) -> usize {
        self.live.len()
    }

    /// Number of handles released so far.
    pub fn released(&self) -> u64 {
        self.released
    }
}

/// One uploaded image and the handle used to preview it.
#[derive(Debug)]
pub struct GalleryEntry {
    /// The uploaded image.
    pub image: UploadedImage,
    /// Its preview handle.
    pub handle: DisplayHandle,
}

/// In-memory gallery: uploads, the active image and instruction, and the
/// current edit result.
///
/// Any change of the active image clears the current result.
#[derive(Debug)]
pub struct Gallery {
    handles: DisplayHandles,
    entries: Vec<GalleryEntry>,
    selected: Option<usize>,
    instruction: String,
    result: Option<EditedImage>,
}

impl Gallery {
    /// Creates an empty gallery.
    pub fn new() -> Result<Self> {
        Ok(Self {
            handles: DisplayHandles::new()?,
            entries: Vec::new(),
            selected: None,
            instruction: String::new(),
            result: None,
        })
    }

    /// Appends a batch of uploads and selects the first of them.
    ///
    /// Returns the number of images added. An empty batch changes nothing.
    pub fn upload(&mut self, batch: Vec<UploadedImage>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut added = Vec::with_capacity(batch.len());
        for image in batch {
            match self.handles.create(&image) {
                Ok(handle) => added.push(GalleryEntry { image, handle }),
                Err(e) => {
                    if let Err(release_err) = self.release_entries(added) {
                        tracing::warn!("failed to roll back partial upload: {release_err}");
                    }
                    return Err(e);
                }
            }
        }

        let first_new = self.entries.len();
        let count = added.len();
        self.entries.extend(added);
        self.selected = Some(first_new);
        self.result = None;
        tracing::debug!(count, total = self.entries.len(), "uploaded images");
        Ok(count)
    }

    /// Releases every current image, then uploads `batch`.
    pub fn replace(&mut self, batch: Vec<UploadedImage>) -> Result<usize> {
        self.release_all()?;
        self.upload(batch)
    }

    /// Removes the image at `index`, releasing its handle.
    pub fn remove(&mut self, index: usize) -> Result<UploadedImage> {
        if index >= self.entries.len() {
            return Err(self.out_of_range(index));
        }
        let entry = self.entries.remove(index);
        self.handles.release(entry.handle)?;

        self.selected = match self.selected {
            Some(s) if s == index => {
                self.result = None;
                None
            }
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        Ok(entry.image)
    }

    /// Makes the image at `index` active and clears the current result.
    pub fn select(&mut self, index: usize) -> Result<&GalleryEntry> {
        if index >= self.entries.len() {
            return Err(self.out_of_range(index));
        }
        self.selected = Some(index);
        self.result = None;
        Ok(&self.entries[index])
    }

    /// The active image, if any.
    pub fn selected(&self) -> Option<&GalleryEntry> {
        self.selected.and_then(|i| self.entries.get(i))
    }

    /// Index of the active image, if any.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// All entries in upload order.
    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Whether nothing has been uploaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The current instruction text.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Replaces the instruction text.
    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        self.instruction = instruction.into();
    }

    /// Uses a preset as the instruction. Ignored when no image is selected.
    pub fn apply_preset(&mut self, preset: &str) -> bool {
        if self.selected().is_none() {
            return false;
        }
        self.instruction = preset.to_string();
        true
    }

    /// The current edit result.
    pub fn result(&self) -> Option<&EditedImage> {
        self.result.as_ref()
    }

    /// Stores a new current result, replacing the previous one.
    pub fn set_result(&mut self, result: EditedImage) -> &EditedImage {
        self.result.insert(result)
    }

    /// Drops the current result.
    pub fn clear_result(&mut self) {
        self.result = None;
    }

    /// Preview handle bookkeeping.
    pub fn handles(&self) -> &DisplayHandles {
        &self.handles
    }

    /// Releases every handle. Returns how many were released.
    pub fn close(mut self) -> Result<usize> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<usize> {
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        self.selected = None;
        self.result = None;
        self.release_entries(entries)?;
        Ok(count)
    }

    /// Releases every handle in `entries`, reporting the first failure only
    /// after all of them were given back.
    fn release_entries(&mut self, entries: Vec<GalleryEntry>) -> Result<()> {
        let mut first_error = None;
        for entry in entries {
            if let Err(e) = self.handles.release(entry.handle) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn out_of_range(&self, index: usize) -> EditError {
        EditError::InvalidRequest(format!(
            "no image #{} in the gallery ({} uploaded)",
            index + 1,
            self.entries.len()
        ))
    }
}

impl Drop for Gallery {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            tracing::warn!("failed to release preview files: {e}");
        }
    }
}
