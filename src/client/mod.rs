//! Batch client: selected files, their conversion lifecycle, and the HTTP
//! transport to the conversion server.

pub mod orchestrator;
pub mod registry;
pub mod transport;
pub mod view;

pub use orchestrator::{BatchSummary, ConversionOrchestrator};
pub use registry::{AddOutcome, ConversionStatus, FileId, FileRegistry, SourceFile};
pub use transport::{ClientError, ConversionClient, HttpConversionClient};
