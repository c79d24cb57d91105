//! Audio file metadata extraction.
//!
//! Uses the lofty crate for format-independent metadata access behind the
//! [`MetadataExtractor`] trait, so the indexer and cover cache never touch
//! lofty directly and tests can substitute a fake.
//!
//! # Readers
//!
//! lofty can open a file two ways, modelled as [`TagReader`] variants:
//! - [`DirectReader`] resolves the format from the file extension
//! - [`ProbingReader`] sniffs the format from the leading bytes
//!
//! [`LoftyExtractor`] tries them in order, so a file whose extension lies
//! about its container still gets indexed.

use lofty::error::LoftyError;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Metadata extracted from an audio file.
///
/// Absent or blank tag values are `None`; callers decide the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub track_no: Option<u32>,
    pub disc_no: Option<u32>,
    pub duration_ms: u64,
    /// Audio bitrate in kbps
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    /// First embedded picture, if any
    pub picture: Option<EmbeddedPicture>,
}

/// Raw picture bytes embedded in a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPicture {
    pub data: Vec<u8>,
}

/// Reads structured metadata from an audio file.
///
/// Implementations must be cheap to share across the scanner, the watcher
/// consumer and the cover cache.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<AudioMetadata>;
}

/// Run `extractor` on the blocking pool so file parsing never stalls a
/// runtime worker.
pub async fn extract_blocking(
    extractor: &Arc<dyn MetadataExtractor>,
    path: &Path,
) -> Result<AudioMetadata> {
    let extractor = Arc::clone(extractor);
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || extractor.extract(&owned))
        .await
        .map_err(|e| Error::metadata(path, format!("extraction task failed: {e}")))?
}

/// One way of opening a file with lofty.
pub trait TagReader: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn read(&self, path: &Path) -> std::result::Result<TaggedFile, LoftyError>;
}

/// Opens files by trusting their extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectReader;

impl TagReader for DirectReader {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn read(&self, path: &Path) -> std::result::Result<TaggedFile, LoftyError> {
        Probe::open(path)?.read()
    }
}

/// Opens files by sniffing the container from its content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbingReader;

impl TagReader for ProbingReader {
    fn name(&self) -> &'static str {
        "probing"
    }

    fn read(&self, path: &Path) -> std::result::Result<TaggedFile, LoftyError> {
        Probe::open(path)?.guess_file_type()?.read()
    }
}

/// Production extractor backed by lofty.
pub struct LoftyExtractor {
    readers: Vec<Box<dyn TagReader>>,
}

impl LoftyExtractor {
    /// Direct reader first, content probing as the fallback.
    pub fn new() -> Self {
        Self::with_readers(vec![Box::new(DirectReader), Box::new(ProbingReader)])
    }

    /// Build an extractor from an explicit, ordered reader list.
    pub fn with_readers(readers: Vec<Box<dyn TagReader>>) -> Self {
        Self { readers }
    }

    fn open(&self, path: &Path) -> Result<TaggedFile> {
        let mut last_error = None;

        for reader in &self.readers {
            match reader.read(path) {
                Ok(file) => return Ok(file),
                Err(e) => {
                    tracing::debug!(
                        target: "metadata",
                        path = %path.display(),
                        reader = reader.name(),
                        error = %e,
                        "Reader could not open file"
                    );
                    last_error = Some(format!("{} reader: {}", reader.name(), e));
                }
            }
        }

        Err(Error::metadata(
            path,
            last_error.unwrap_or_else(|| "no metadata reader available".to_string()),
        ))
    }
}

impl Default for LoftyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataExtractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> Result<AudioMetadata> {
        let tagged_file = self.open(path)?;
        Ok(from_tagged_file(&tagged_file))
    }
}

fn from_tagged_file(tagged_file: &TaggedFile) -> AudioMetadata {
    let properties = tagged_file.properties();
    let mut meta = AudioMetadata {
        duration_ms: properties.duration().as_millis() as u64,
        bitrate: properties.audio_bitrate(),
        sample_rate: properties.sample_rate(),
        ..AudioMetadata::default()
    };

    // Get the primary tag, or fall back to the first available tag
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return meta;
    };

    meta.title = non_empty(tag.title().as_deref());
    meta.artist = non_empty(tag.artist().as_deref());
    meta.album_artist = non_empty(tag.get_string(&ItemKey::AlbumArtist));
    meta.album = non_empty(tag.album().as_deref());
    meta.genre = non_empty(tag.genre().as_deref());
    meta.track_no = tag.track();
    meta.disc_no = tag.disk();
    meta.year = tag.year();

    meta.picture = tag.pictures().first().map(|p| EmbeddedPicture {
        data: p.data().to_vec(),
    });

    meta
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
