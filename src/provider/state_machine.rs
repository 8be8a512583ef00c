use std::collections::HashMap;

use crate::common::ResourceKey;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectState {
    #[default]
    Unobserved,
    /// Ours, waiting for the Accepted status to be written.
    Pending,
    /// Ours, status written and published in the resource table.
    Accepted,
    Removed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    /// A create or update was observed.
    Observed { owned: bool, status_current: bool },
    StatusWritten,
    StatusFailed,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    WriteStatus,
    Publish,
    Unpublish,
    Requeue,
}

impl ObjectState {
    pub fn on(self, input: Input) -> (ObjectState, Vec<Effect>) {
        match (self, input) {
            (ObjectState::Accepted, Input::Observed { owned: true, status_current: false }) => {
                (ObjectState::Accepted, vec![Effect::WriteStatus, Effect::Publish])
            }
            (_, Input::Observed { owned: true, status_current: true }) => (ObjectState::Accepted, vec![Effect::Publish]),
            (_, Input::Observed { owned: true, status_current: false }) => (ObjectState::Pending, vec![Effect::WriteStatus]),

            // Handed over to another controller.
            (ObjectState::Accepted, Input::Observed { owned: false, .. }) => (ObjectState::Removed, vec![Effect::Unpublish]),
            (ObjectState::Pending, Input::Observed { owned: false, .. }) => (ObjectState::Unobserved, vec![]),
            (state, Input::Observed { owned: false, .. }) => (state, vec![]),

            (ObjectState::Pending, Input::StatusWritten) => (ObjectState::Accepted, vec![Effect::Publish]),
            (state @ (ObjectState::Pending | ObjectState::Accepted), Input::StatusFailed) => (state, vec![Effect::Requeue]),
            (state, Input::StatusWritten | Input::StatusFailed) => (state, vec![]),

            (ObjectState::Accepted, Input::Deleted) => (ObjectState::Removed, vec![Effect::Unpublish]),
            (_, Input::Deleted) => (ObjectState::Removed, vec![]),
        }
    }
}

/// State of every object identity seen by one watcher. Removed and unobserved
/// identities are forgotten, a later create starts from scratch.
#[derive(Debug, Default)]
pub struct ObjectStates {
    states: HashMap<ResourceKey, ObjectState>,
}

impl ObjectStates {
    pub fn get(&self, key: &ResourceKey) -> ObjectState {
        self.states.get(key).copied().unwrap_or_default()
    }

    pub fn apply(&mut self, key: &ResourceKey, input: Input) -> (ObjectState, Vec<Effect>) {
        let (next, effects) = self.get(key).on(input);
        match next {
            ObjectState::Unobserved | ObjectState::Removed => {
                self.states.remove(key);
            }
            ObjectState::Pending | ObjectState::Accepted => {
                self.states.insert(key.clone(), next);
            }
        }
        (next, effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OURS_NEW: Input = Input::Observed { owned: true, status_current: false };
    const OURS_CURRENT: Input = Input::Observed { owned: true, status_current: true };
    const NOT_OURS: Input = Input::Observed { owned: false, status_current: false };

    #[test]
    fn test_accept_flow() {
        let (state, effects) = ObjectState::Unobserved.on(OURS_NEW);
        assert_eq!(state, ObjectState::Pending);
        assert_eq!(effects, vec![Effect::WriteStatus]);

        let (state, effects) = state.on(Input::StatusWritten);
        assert_eq!(state, ObjectState::Accepted);
        assert_eq!(effects, vec![Effect::Publish]);

        let (state, effects) = state.on(Input::Deleted);
        assert_eq!(state, ObjectState::Removed);
        assert_eq!(effects, vec![Effect::Unpublish]);
    }

    #[test]
    fn test_already_accepted_object_is_published_without_status_write() {
        let (state, effects) = ObjectState::Unobserved.on(OURS_CURRENT);
        assert_eq!(state, ObjectState::Accepted);
        assert_eq!(effects, vec![Effect::Publish]);
    }

    #[test]
    fn test_foreign_objects_are_ignored() {
        for state in [ObjectState::Unobserved, ObjectState::Removed] {
            assert_eq!(state.on(NOT_OURS), (state, vec![]));
        }
        assert_eq!(ObjectState::Pending.on(NOT_OURS), (ObjectState::Unobserved, vec![]));
    }

    #[test]
    fn test_hand_over_to_another_controller_unpublishes() {
        assert_eq!(ObjectState::Accepted.on(NOT_OURS), (ObjectState::Removed, vec![Effect::Unpublish]));
    }

    #[test]
    fn test_status_failure_requeues() {
        assert_eq!(ObjectState::Pending.on(Input::StatusFailed), (ObjectState::Pending, vec![Effect::Requeue]));
        assert_eq!(ObjectState::Accepted.on(Input::StatusFailed), (ObjectState::Accepted, vec![Effect::Requeue]));
        assert_eq!(ObjectState::Removed.on(Input::StatusFailed), (ObjectState::Removed, vec![]));
    }

    #[test]
    fn test_updates_replace_published_object() {
        assert_eq!(ObjectState::Accepted.on(OURS_CURRENT), (ObjectState::Accepted, vec![Effect::Publish]));
        assert_eq!(ObjectState::Accepted.on(OURS_NEW), (ObjectState::Accepted, vec![Effect::WriteStatus, Effect::Publish]));
    }

    #[test]
    fn test_stale_status_responses_are_ignored() {
        assert_eq!(ObjectState::Unobserved.on(Input::StatusWritten), (ObjectState::Unobserved, vec![]));
        assert_eq!(ObjectState::Removed.on(Input::StatusWritten), (ObjectState::Removed, vec![]));
    }

    #[test]
    fn test_delete_of_unpublished_object() {
        assert_eq!(ObjectState::Pending.on(Input::Deleted), (ObjectState::Removed, vec![]));
        assert_eq!(ObjectState::Unobserved.on(Input::Deleted), (ObjectState::Removed, vec![]));
    }

    #[test]
    fn test_object_states_forget_terminal_identities() {
        let mut states = ObjectStates::default();
        let key = ResourceKey::gateway_class("envoy");
        states.apply(&key, OURS_NEW);
        assert_eq!(states.get(&key), ObjectState::Pending);
        states.apply(&key, Input::StatusWritten);
        assert_eq!(states.get(&key), ObjectState::Accepted);
        let (state, _) = states.apply(&key, Input::Deleted);
        assert_eq!(state, ObjectState::Removed);
        assert_eq!(states.get(&key), ObjectState::Unobserved);
        let (state, effects) = states.apply(&key, OURS_NEW);
        assert_eq!(state, ObjectState::Pending);
        assert_eq!(effects, vec![Effect::WriteStatus]);
    }
}
