use std::collections::HashSet;

/// Allow-list of actor ids admitted to administrative endpoints.
///
/// Callers without a positive actor id are always rejected. Past that check
/// an empty list admits every caller and a non-empty list admits only the
/// listed ids.
#[derive(Debug, Clone, Default)]
pub struct AdminAuthorizer {
    allowed: HashSet<i64>,
}

impl AdminAuthorizer {
    pub fn new(actor_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            allowed: actor_ids.into_iter().filter(|id| *id > 0).collect(),
        }
    }

    pub fn open() -> Self {
        Self::default()
    }

    pub fn is_admin(&self, actor: Option<i64>) -> bool {
        let Some(id) = actor.filter(|id| *id > 0) else {
            return false;
        };
        self.allowed.is_empty() || self.allowed.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_admits_identified_callers_only() {
        let guard = AdminAuthorizer::open();
        assert!(guard.is_admin(Some(12)));
        assert!(!guard.is_admin(None));
        assert!(!guard.is_admin(Some(0)));
        assert!(!guard.is_admin(Some(-1)));
    }

    #[test]
    fn allow_list_restricts_callers() {
        let guard = AdminAuthorizer::new([7, -3, 0]);
        assert!(guard.is_admin(Some(7)));
        assert!(!guard.is_admin(Some(8)));
        assert!(!guard.is_admin(Some(-3)));
        assert!(!guard.is_admin(None));
    }
}
