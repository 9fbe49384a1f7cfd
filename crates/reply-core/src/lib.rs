pub mod config;
pub mod error;
pub mod event;
pub mod source;

pub use config::AppConfig;
pub use error::ReplyError;
pub use event::{Direction, Event, RawEvent, SourceKind};
pub use source::{EventSource, FetchedEvents, SourceId, SourceRegistry};
