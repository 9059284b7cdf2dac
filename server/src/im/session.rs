use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use log::debug;
use uuid::Uuid;

struct GroupSession {
    session_id: Uuid,
    participants: HashSet<Uuid>,
}

/// Chat sessions keyed by group id.
///
/// Lookup and creation happen under one lock, so two messages racing
/// for a group that has no session yet agree on a single session id.
/// A session lives as long as it has participants; when the last one
/// leaves it is dropped, and a later message starts a fresh session
/// under a new id.
pub struct GroupSessions {
    sessions: Mutex<HashMap<Uuid, GroupSession>>,
}

impl GroupSessions {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, GroupSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The group's session id, creating the session first if none
    /// exists. A new session is seeded with the given participants.
    pub fn get_or_create(&self, group_id: &Uuid, seed: &[Uuid]) -> Uuid {
        let mut sessions = self.lock();
        let session = sessions.entry(*group_id).or_insert_with(|| {
            let session_id = Uuid::new_v4();
            debug!("Starting IM session {} for group {}", session_id, group_id);
            GroupSession {
                session_id,
                participants: seed.iter().copied().collect(),
            }
        });
        session.session_id
    }

    /// Adds a participant to an existing session. Returns false when
    /// the group has no session.
    pub fn join(&self, group_id: &Uuid, agent_id: Uuid) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(group_id) {
            Some(session) => {
                session.participants.insert(agent_id);
                true
            }
            None => false,
        }
    }

    /// Removes a participant; the session is dropped when its last
    /// participant leaves. Returns true when that garbage collection
    /// happened.
    pub fn leave(&self, group_id: &Uuid, agent_id: &Uuid) -> bool {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(group_id) else {
            return false;
        };
        session.participants.remove(agent_id);
        if session.participants.is_empty() {
            debug!(
                "IM session {} for group {} is empty, dropping it",
                session.session_id, group_id
            );
            sessions.remove(group_id);
            true
        } else {
            false
        }
    }

    pub fn session_id(&self, group_id: &Uuid) -> Option<Uuid> {
        self.lock().get(group_id).map(|session| session.session_id)
    }

    pub fn participants(&self, group_id: &Uuid) -> Vec<Uuid> {
        self.lock()
            .get(group_id)
            .map(|session| session.participants.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GroupSessions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_stable_until_empty() {
        let sessions = GroupSessions::new();
        let group = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let first = sessions.get_or_create(&group, &[alice, bob]);
        assert_eq!(sessions.get_or_create(&group, &[]), first);
        assert_eq!(sessions.session_id(&group), Some(first));
        assert_eq!(sessions.participants(&group).len(), 2);

        assert!(!sessions.leave(&group, &alice));
        assert!(sessions.leave(&group, &bob));
        assert_eq!(sessions.session_id(&group), None);
        assert!(sessions.is_empty());

        // the next message starts a new session under a fresh id
        let second = sessions.get_or_create(&group, &[alice]);
        assert_ne!(second, first);
    }

    #[test]
    fn join_requires_an_existing_session() {
        let sessions = GroupSessions::new();
        let group = Uuid::new_v4();
        let agent = Uuid::new_v4();
        assert!(!sessions.join(&group, agent));

        sessions.get_or_create(&group, &[]);
        assert!(sessions.join(&group, agent));
        assert_eq!(sessions.participants(&group), vec![agent]);
    }

    #[test]
    fn leave_of_unknown_group_is_a_no_op() {
        let sessions = GroupSessions::new();
        assert!(!sessions.leave(&Uuid::new_v4(), &Uuid::new_v4()));
    }
}
