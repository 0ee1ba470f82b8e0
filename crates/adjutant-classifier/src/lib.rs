//! Message classification: judge call, verdict validation, confidence
//! banding, and the deferred MEDIUM prompt.

pub mod judge;
pub mod pipeline;

pub use judge::{Classification, RawType};
pub use pipeline::{ClassifierPipeline, ClassifyRequest};
