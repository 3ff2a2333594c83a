pub mod panel;
pub mod source;

pub use panel::{ExtractionPanel, PanelState};
pub use source::{PollSource, ProgressSource, SourceKind, StreamSource};
