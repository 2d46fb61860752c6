pub mod assignment;
pub mod error;
pub mod events;
pub mod id;
pub mod resource;
pub mod time;
pub mod version;

pub use assignment::{Assignment, AuditAction, AuditEvent, AuditEventBuilder, FieldChange};
pub use error::{CoreError, ErrorCategory, Result};
pub use events::AuditBroadcaster;
pub use id::generate_id;
pub use resource::{
    HardwareStatus, HardwareUnit, Holder, ResourceKind, ResourceRecord, ResourceRef,
    SoftwareLicense,
};
pub use time::{UtcDateTime, now_utc};
pub use version::CacheVersionStamp;
