pub mod event;
pub mod policy;
pub mod projection;

pub use event::{CanonicalEvent, EventKind, RowImage};
pub use policy::{CapturePolicy, ColumnSelector, TablePolicy};
pub use projection::Projection;
