//! Extract stage: sources, the raw archive and the partition fetcher.

mod archive;
mod fetcher;
mod payload;
mod source;

pub use archive::{archive_stem, FsRawArchive, NoArchive, RawArchive};
pub use fetcher::Fetcher;
pub use payload::PayloadFormat;
#[cfg(feature = "http")]
pub use source::HttpMeasurementSource;
pub use source::{CsvFileSource, MeasurementSource};
