pub mod error;
pub mod types;

pub use error::{ValidationError, Violation};
pub use types::{
    ContentType, Item, ItemType, LabelCategory, LlmSource, MenuLabel, MetadataRecord, OcrSource,
    Sources, TechSource, Title,
};
