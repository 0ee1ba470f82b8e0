//! Upstream message ingestion: the transport contract, the filter chain, and
//! routing into the classifier.

pub mod caches;
pub mod handler;
pub mod listener;

pub use handler::Ingestor;
pub use listener::{
    AccountListener, ChatEvent, ChatKind, EntityResolver, ForwardKind, IngestError, MediaKind,
    SenderInfo,
};
