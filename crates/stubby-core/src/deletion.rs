use crate::short_id::ShortId;
use crate::user_id::UserId;

/// A request to soft-delete some of a user's links.
///
/// Only links owned by `user_id` are affected; ids the user does not own
/// are ignored by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub user_id: UserId,
    pub short_ids: Vec<ShortId>,
}

impl DeleteRequest {
    pub fn new(user_id: UserId, short_ids: Vec<ShortId>) -> Self {
        Self { user_id, short_ids }
    }

    pub fn is_empty(&self) -> bool {
        self.short_ids.is_empty()
    }
}
