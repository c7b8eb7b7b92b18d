//! Crafting history.
//!
//! A bounded list of previously crafted recipes with a selection cursor and
//! a transient stash slot for entries that were synthesized but never
//! crafted.
//!
//! # Persisted form
//!
//! Each entry is stored as one semicolon-delimited string,
//! `recipe;output;cell0;...;cell8`, using registry names. Cells whose names
//! no longer resolve decode to empty cells. An entry whose recipe no longer
//! resolves, or whose field count is wrong, decodes to a placeholder with
//! empty cells: it keeps its position and capacity share until evicted but
//! is never selected for use. The whole cache is wrapped in a
//! [`HistoryBlob`] which is written with bincode behind a magic-byte prefix.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};
use workbench_common::{ItemTypeId, MagicBytes, RecipeId, SchemaVersion, WorkbenchError};

use crate::catalog::NameRegistry;
use crate::grid::GRID_SLOTS;

/// Upper bound of the history capacity.
pub const MAX_HISTORY_CAPACITY: usize = 32;

/// Number of fields in an encoded entry.
const ENTRY_FIELDS: usize = 2 + GRID_SLOTS;

/// History codec errors.
#[derive(Debug, Error)]
pub enum HistoryCodecError {
    /// The blob does not start with the history magic bytes
    #[error("Invalid history blob format")]
    InvalidFormat,

    /// The blob was written by an incompatible schema version
    #[error("Incompatible history version: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this build reads
        expected: SchemaVersion,
        /// Version found in the blob
        found: SchemaVersion,
    },

    /// The container could not be encoded or decoded
    #[error("History blob corrupted: {0}")]
    Corrupted(String),
}

/// Result type for history codec operations.
pub type HistoryCodecResult<T> = Result<T, HistoryCodecError>;

impl From<HistoryCodecError> for WorkbenchError {
    fn from(err: HistoryCodecError) -> Self {
        match err {
            HistoryCodecError::VersionMismatch { expected, found } => Self::VersionMismatch {
                expected: expected.to_string(),
                actual: found.to_string(),
            },
            HistoryCodecError::InvalidFormat => {
                Self::InvalidData("not a crafting history blob".to_string())
            }
            HistoryCodecError::Corrupted(msg) => Self::Serialization(msg),
        }
    }
}

/// One recorded craft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Recipe that was crafted
    pub recipe_id: RecipeId,
    /// Output identity of the recipe
    pub output: ItemTypeId,
    /// Input identities, row-major (`NONE` for empty cells)
    pub cells: [ItemTypeId; GRID_SLOTS],
}

impl HistoryEntry {
    /// Create an entry.
    #[must_use]
    pub const fn new(recipe_id: RecipeId, output: ItemTypeId, cells: [ItemTypeId; GRID_SLOTS]) -> Self {
        Self {
            recipe_id,
            output,
            cells,
        }
    }

    /// Entry left behind by an undecodable string.
    #[must_use]
    pub const fn placeholder() -> Self {
        Self::new(RecipeId::NONE, ItemTypeId::NONE, [ItemTypeId::NONE; GRID_SLOTS])
    }

    /// Check if this entry has no usable recipe.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.recipe_id.is_none()
    }

    /// Encode as `recipe;output;cell0;...;cell8`.
    ///
    /// Returns `None` when the recipe or output has no registry name.
    #[must_use]
    pub fn encode<N: NameRegistry + ?Sized>(&self, names: &N) -> Option<String> {
        let mut fields = Vec::with_capacity(ENTRY_FIELDS);
        fields.push(names.recipe_name(self.recipe_id)?);
        fields.push(names.item_name(self.output)?);
        for cell in &self.cells {
            fields.push(if cell.is_none() {
                ""
            } else {
                names.item_name(*cell).unwrap_or("")
            });
        }
        Some(fields.join(";"))
    }

    /// Decode an encoded entry.
    ///
    /// Missing trailing cells and unknown item names decode to empty cells.
    /// A string whose recipe name does not resolve, or which has fewer than
    /// two or more than eleven fields, decodes to [`HistoryEntry::placeholder`].
    #[must_use]
    pub fn decode<N: NameRegistry + ?Sized>(encoded: &str, names: &N) -> Self {
        let fields: Vec<&str> = encoded.split(';').collect();
        if fields.len() < 2 || fields.len() > ENTRY_FIELDS {
            warn!("Malformed history entry '{}'", encoded);
            return Self::placeholder();
        }
        let Some(recipe_id) = names.recipe_by_name(fields[0]) else {
            warn!("Unknown recipe '{}' in history entry", fields[0]);
            return Self::placeholder();
        };
        let output = names.item_by_name(fields[1]).unwrap_or(ItemTypeId::NONE);

        let mut cells = [ItemTypeId::NONE; GRID_SLOTS];
        for (cell, name) in cells.iter_mut().zip(fields[2..].iter()) {
            if name.is_empty() {
                continue;
            }
            *cell = names.item_by_name(name).unwrap_or_else(|| {
                trace!("Unknown item '{}' in history entry", name);
                ItemTypeId::NONE
            });
        }
        Self::new(recipe_id, output, cells)
    }
}

/// Bounded crafting history with a selection cursor and a stash slot.
///
/// `cursor` and `stash` are mutually exclusive: selecting clears the stash
/// and stashing clears the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCache {
    entries: Vec<HistoryEntry>,
    capacity: usize,
    cursor: Option<usize>,
    stash: Option<HistoryEntry>,
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(MAX_HISTORY_CAPACITY)
    }
}

impl HistoryCache {
    /// Create an empty cache; `capacity` is clamped to `0..=32`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.min(MAX_HISTORY_CAPACITY),
            cursor: None,
            stash: None,
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.min(MAX_HISTORY_CAPACITY);
        self.evict_overflow();
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Selected entry index.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The stashed entry.
    #[must_use]
    pub fn stashed(&self) -> Option<&HistoryEntry> {
        self.stash.as_ref()
    }

    /// Record a completed craft.
    ///
    /// Any entry with the same recipe or the same cell signature is replaced,
    /// the oldest entries are evicted beyond capacity and the selection is
    /// reset.
    pub fn record(&mut self, cells: [ItemTypeId; GRID_SLOTS], recipe_id: RecipeId, output: ItemTypeId) {
        let entry = HistoryEntry::new(recipe_id, output, cells);
        self.entries
            .retain(|e| e.recipe_id != recipe_id && e.cells != cells);
        self.entries.push(entry);
        self.evict_overflow();
        self.reset();
        debug!("Recorded {} in history ({} entries)", recipe_id, self.entries.len());
    }

    fn evict_overflow(&mut self) {
        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.capacity;
            self.entries.drain(..excess);
            self.cursor = self.cursor.and_then(|c| c.checked_sub(excess));
            debug!("Evicted {} history entries", excess);
        }
    }

    /// Select the next entry; past the newest the selection wraps to none.
    pub fn next(&mut self) {
        self.stash = None;
        if self.entries.is_empty() {
            return;
        }
        self.cursor = match self.cursor {
            None => Some(0),
            Some(i) if i + 1 < self.entries.len() => Some(i + 1),
            Some(_) => None,
        };
    }

    /// Select the previous entry; before the oldest the selection wraps to
    /// none.
    pub fn prev(&mut self) {
        self.stash = None;
        if self.entries.is_empty() {
            return;
        }
        self.cursor = match self.cursor {
            None => Some(self.entries.len() - 1),
            Some(0) => None,
            Some(i) => Some(i - 1),
        };
    }

    /// Clear both the selection and the stash.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.stash = None;
    }

    /// Select an entry by index. Clears the stash.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        self.stash = None;
        self.cursor = Some(index);
        true
    }

    /// Index of the newest entry producing `output`.
    #[must_use]
    pub fn find_by_output(&self, output: ItemTypeId) -> Option<usize> {
        if output.is_none() {
            return None;
        }
        self.entries.iter().rposition(|e| e.output == output)
    }

    /// Place a synthesized entry in the stash. Clears the cursor.
    pub fn stash(&mut self, entry: HistoryEntry) {
        trace!("Stashed {}", entry.recipe_id);
        self.cursor = None;
        self.stash = Some(entry);
    }

    /// The stash if set, else the selected entry. Placeholders are never
    /// current.
    #[must_use]
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.stash
            .as_ref()
            .or_else(|| self.cursor.and_then(|i| self.entries.get(i)))
            .filter(|e| !e.is_placeholder())
    }

    /// Remove every entry and the selection.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.reset();
    }

    /// Convert to the persisted form.
    ///
    /// Entries without registry names are written as empty strings so that
    /// the cursor and the eviction order survive the round trip.
    #[must_use]
    pub fn to_blob<N: NameRegistry + ?Sized>(&self, names: &N) -> HistoryBlob {
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                entry.encode(names).unwrap_or_else(|| {
                    if !entry.is_placeholder() {
                        warn!("History entry {} has no registry name", entry.recipe_id);
                    }
                    String::new()
                })
            })
            .collect();
        HistoryBlob {
            version: SchemaVersion::HISTORY_BLOB,
            capacity: u32::try_from(self.capacity).unwrap_or(0),
            cursor: self.cursor.and_then(|c| u32::try_from(c).ok()),
            entries,
            stash: self.stash.as_ref().and_then(|e| e.encode(names)),
        }
    }

    /// Rebuild from the persisted form.
    ///
    /// Every encoded entry keeps its position. When the blob holds more
    /// entries than its capacity the oldest are evicted and the cursor
    /// follows its entry, or is cleared if that entry was evicted.
    #[must_use]
    pub fn from_blob<N: NameRegistry + ?Sized>(blob: &HistoryBlob, names: &N) -> Self {
        let mut cache = Self::new(blob.capacity as usize);
        cache.entries = blob
            .entries
            .iter()
            .map(|encoded| HistoryEntry::decode(encoded, names))
            .collect();
        cache.cursor = blob
            .cursor
            .map(|c| c as usize)
            .filter(|&c| c < cache.entries.len());
        cache.evict_overflow();
        if let Some(encoded) = &blob.stash {
            let entry = HistoryEntry::decode(encoded, names);
            if !entry.is_placeholder() {
                cache.stash(entry);
            }
        }
        cache
    }
}

/// Persisted form of a [`HistoryCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryBlob {
    /// Schema version the blob was written with
    pub version: SchemaVersion,
    /// Cache capacity
    pub capacity: u32,
    /// Selected entry index
    pub cursor: Option<u32>,
    /// Encoded entries, oldest first
    pub entries: Vec<String>,
    /// Encoded stash entry
    pub stash: Option<String>,
}

impl HistoryBlob {
    /// Serialize to bytes (magic prefix plus bincode payload).
    pub fn to_bytes(&self) -> HistoryCodecResult<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&MagicBytes::HISTORY.bytes());

        let data =
            bincode::serialize(self).map_err(|e| HistoryCodecError::Corrupted(e.to_string()))?;
        buffer.extend(data);

        Ok(buffer)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> HistoryCodecResult<Self> {
        if !MagicBytes::HISTORY.prefixes(bytes) {
            return Err(HistoryCodecError::InvalidFormat);
        }

        let blob: Self = bincode::deserialize(&bytes[4..])
            .map_err(|e| HistoryCodecError::Corrupted(e.to_string()))?;

        if !SchemaVersion::HISTORY_BLOB.can_read(&blob.version) {
            return Err(HistoryCodecError::VersionMismatch {
                expected: SchemaVersion::HISTORY_BLOB,
                found: blob.version,
            });
        }

        Ok(blob)
    }
}
