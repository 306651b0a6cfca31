//! Moderation roles and the authorization seam.
//!
//! Authentication lives outside this crate; callers hand the engine an
//! [`Actor`] and an [`Authorizer`] decides which moderation role it holds.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

pub const ROLE_CONTENT_ADMIN: &str = "content_admin";
pub const ROLE_CONTENT_MANAGER: &str = "content_manager";

/// The user performing an operation, as seen by the moderation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: DbId,
    /// Group memberships (primary keys of the auth layer's groups).
    #[serde(default)]
    pub groups: Vec<DbId>,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Actor {
    pub fn new(id: DbId) -> Self {
        Self {
            id,
            groups: Vec::new(),
            is_superuser: false,
        }
    }

    pub fn with_group(mut self, group_id: DbId) -> Self {
        self.groups.push(group_id);
        self
    }
}

/// Moderation role resolved for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationRole {
    ContentAdmin,
    ContentManager,
    /// Neither role: may not change versioned content.
    Viewer,
}

impl ModerationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentAdmin => ROLE_CONTENT_ADMIN,
            Self::ContentManager => ROLE_CONTENT_MANAGER,
            Self::Viewer => "viewer",
        }
    }
}

/// Answers the two role questions the moderation layer asks.
pub trait Authorizer: Send + Sync {
    fn is_content_admin(&self, actor: &Actor) -> bool;
    fn is_content_manager(&self, actor: &Actor) -> bool;

    /// Admin wins when an actor holds both roles.
    fn role_of(&self, actor: &Actor) -> ModerationRole {
        if self.is_content_admin(actor) {
            ModerationRole::ContentAdmin
        } else if self.is_content_manager(actor) {
            ModerationRole::ContentManager
        } else {
            ModerationRole::Viewer
        }
    }
}

/// Group-membership authorizer: admins are members of the content admin
/// group or superusers, managers are members of the content manager group.
#[derive(Debug, Clone)]
pub struct GroupAuthorizer {
    pub content_admin_group_id: DbId,
    pub content_manager_group_id: DbId,
}

impl GroupAuthorizer {
    pub fn new(content_admin_group_id: DbId, content_manager_group_id: DbId) -> Self {
        Self {
            content_admin_group_id,
            content_manager_group_id,
        }
    }
}

impl Default for GroupAuthorizer {
    fn default() -> Self {
        Self::new(1, 2)
    }
}

impl Authorizer for GroupAuthorizer {
    fn is_content_admin(&self, actor: &Actor) -> bool {
        actor.is_superuser || actor.groups.contains(&self.content_admin_group_id)
    }

    fn is_content_manager(&self, actor: &Actor) -> bool {
        actor.groups.contains(&self.content_manager_group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_is_content_admin() {
        let auth = GroupAuthorizer::default();
        let mut actor = Actor::new(7);
        actor.is_superuser = true;
        assert!(auth.is_content_admin(&actor));
        assert_eq!(auth.role_of(&actor), ModerationRole::ContentAdmin);
    }

    #[test]
    fn group_membership_decides_role() {
        let auth = GroupAuthorizer::new(10, 20);
        assert_eq!(
            auth.role_of(&Actor::new(1).with_group(10)),
            ModerationRole::ContentAdmin
        );
        assert_eq!(
            auth.role_of(&Actor::new(2).with_group(20)),
            ModerationRole::ContentManager
        );
        assert_eq!(auth.role_of(&Actor::new(3)), ModerationRole::Viewer);
    }

    #[test]
    fn admin_wins_over_manager() {
        let auth = GroupAuthorizer::new(10, 20);
        let actor = Actor::new(1).with_group(20).with_group(10);
        assert_eq!(auth.role_of(&actor), ModerationRole::ContentAdmin);
        assert!(auth.is_content_manager(&actor));
    }
}
