use crate::api::{Role, SessionContext, UserId};

/// Registering, editing and deleting books, uploading covers
pub fn can_manage_catalog(session: &SessionContext) -> bool {
    session.role == Role::Admin
}

/// Authors may delete their own review, admins any review
pub fn can_delete_review(session: &SessionContext, review_author: UserId) -> bool {
    session.role == Role::Admin || session.user_id == review_author
}

pub fn can_edit_profile(session: &SessionContext, profile_owner: UserId) -> bool {
    session.user_id == profile_owner
}
