//! Work identifier allocation.

use crate::model::WorkId;
use uuid::Uuid;

/// Source of globally unique work ids.
pub trait WorkIdSource: Send + Sync {
    fn new_work_id(&self) -> WorkId;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidWorkIds;

impl WorkIdSource for UuidWorkIds {
    fn new_work_id(&self) -> WorkId {
        WorkId(Uuid::new_v4().to_string())
    }
}
