mod chapter;
mod column;
mod document;
mod id;
mod subject;

pub use chapter::Chapter;
pub use column::Column;
pub use document::{Document, PartialDocument};
pub use id::{generate_id, IdGenerator, RandomIds, SequentialIds};
pub use subject::Subject;
