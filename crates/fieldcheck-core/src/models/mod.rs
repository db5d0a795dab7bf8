//! Data models

mod equipment;
mod outbox;
mod photo;
mod remote_cache;
mod submission;
mod template;

pub use equipment::Equipment;
pub use outbox::{OutboxEntry, OutboxOp};
pub use photo::{Photo, PhotoId};
pub use remote_cache::RemoteCacheEntry;
pub use submission::{Answer, AnswerValue, Submission, SubmissionId};
pub use template::{Field, FieldKind, Template, TemplateId};
