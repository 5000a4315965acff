//! Authorization collaborator.
//!
//! The queue never authenticates anyone. Callers hand it user ids they have
//! already authenticated, and a [`RoleProvider`] answers whether a user holds
//! the administrator role.

use crate::config::QueueConfig;
use crate::task::UserId;
use std::collections::HashSet;

/// Answers "is this user an administrator".
pub trait RoleProvider: Send + Sync {
    fn is_admin(&self, user_id: UserId) -> bool;
}

/// Fixed set of administrator ids.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    admins: HashSet<UserId>,
}

impl StaticRoles {
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    /// Administrators listed under `admin_users`.
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.admin_users.iter().copied())
    }

    pub fn grant(&mut self, user_id: UserId) {
        self.admins.insert(user_id);
    }
}

impl RoleProvider for StaticRoles {
    fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id)
    }
}

impl<F> RoleProvider for F
where
    F: Fn(UserId) -> bool + Send + Sync,
{
    fn is_admin(&self, user_id: UserId) -> bool {
        self(user_id)
    }
}
