//! Ready-made adapters configured with closures
//!
//! Most archives fall into one of two shapes: a file whose URL follows from the
//! key ([`SingleFileSource`]) or a directory index listing the key's files
//! ([`ListingSource`]). Both take URL and file-name templates as closures and a
//! [`Decoder`] for the payload.

pub mod decoders;
mod listing;
mod single_file;

use std::sync::Arc;

use crate::time_key::TimeKey;

pub use decoders::{Decoder, Gzip, PassThrough, ZipMember};
pub use listing::ListingSource;
pub use single_file::SingleFileSource;

/// Renders a URL or file name from a time key
pub type KeyTemplate = Arc<dyn Fn(&TimeKey) -> String + Send + Sync>;
