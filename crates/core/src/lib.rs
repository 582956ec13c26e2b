//! Message schema, editable request model and recomposition for promptgate.

pub mod hash;
pub mod key;
pub mod message;
pub mod override_set;
pub mod recompose;
pub mod request;
pub mod validate;

pub use key::{InterceptionKey, Surface};
pub use message::{ContentPart, ImageDetail, Message, Role, ToolCall};
pub use override_set::{
    ApplyReport, BackendError, OverrideBackend, OverrideScope, OverrideSet, SectionOverride,
    SkippedOverride,
};
pub use recompose::{recompose, Recomposed, StaleEdit};
pub use request::{
    build_sections, EditError, EditPath, EditableChatRequest, LeafEdit, MetadataSeed,
    ParityStatus, RequestMetadata, RequestOptions, Section, SectionKind,
};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
