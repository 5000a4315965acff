//! Dequeue ordering.

use crate::auth::RoleProvider;
use crate::task::Task;
use std::cmp::Ordering;

/// Order in which QUEUED tasks are started.
///
/// Selection criteria:
/// 1. Priority (urgent > high > normal > low)
/// 2. Tasks owned by an administrator
/// 3. Earliest `created_at`
/// 4. Task id, so the order is total
pub(super) fn dequeue_order(a: &Task, b: &Task, roles: &dyn RoleProvider) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| roles.is_admin(b.user_id).cmp(&roles.is_admin(a.user_id)))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Pick the task that should start next.
pub(super) fn select_next<'a>(
    candidates: impl IntoIterator<Item = &'a Task>,
    roles: &dyn RoleProvider,
) -> Option<&'a Task> {
    candidates
        .into_iter()
        .min_by(|a, b| dequeue_order(a, b, roles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticRoles;
    use crate::task::TaskPriority;
    use chrono::{Duration, Utc};

    fn task(user_id: i64, priority: TaskPriority, minutes_ago: i64) -> Task {
        let mut task = Task::new(user_id, 1).with_priority(priority);
        task.created_at = Utc::now() - Duration::minutes(minutes_ago);
        task
    }

    #[test]
    fn test_priority_wins_over_age() {
        let roles = StaticRoles::default();
        let old_low = task(1, TaskPriority::Low, 60);
        let new_high = task(2, TaskPriority::High, 1);

        let tasks = [old_low, new_high.clone()];
        assert_eq!(select_next(&tasks, &roles).unwrap().id, new_high.id);
    }

    #[test]
    fn test_admin_owner_breaks_priority_tie() {
        let roles = StaticRoles::new([9]);
        let user = task(1, TaskPriority::Normal, 30);
        let admin = task(9, TaskPriority::Normal, 1);

        let tasks = [user, admin.clone()];
        assert_eq!(select_next(&tasks, &roles).unwrap().id, admin.id);
    }

    #[test]
    fn test_admin_owner_does_not_beat_higher_priority() {
        let roles = StaticRoles::new([9]);
        let user = task(1, TaskPriority::High, 1);
        let admin = task(9, TaskPriority::Normal, 30);

        let tasks = [admin, user.clone()];
        assert_eq!(select_next(&tasks, &roles).unwrap().id, user.id);
    }

    #[test]
    fn test_fifo_within_priority() {
        let roles = StaticRoles::default();
        let first = task(1, TaskPriority::Normal, 10);
        let second = task(2, TaskPriority::Normal, 5);

        let tasks = [second.clone(), first.clone()];
        assert_eq!(select_next(&tasks, &roles).unwrap().id, first.id);
        assert_eq!(
            dequeue_order(&first, &second, &roles),
            Ordering::Less
        );
    }

    #[test]
    fn test_select_from_empty() {
        let roles = StaticRoles::default();
        assert!(select_next(&[], &roles).is_none());
    }
}
