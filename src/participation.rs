//! Participation store
//!
//! Each user is in at most one of the joined / thinking / skipped sets of a
//! ride. The storage layer writes a state as a single keyed upsert inside a
//! transaction, so racing requests for the same user always leave exactly
//! one membership behind.

use crate::db::Database;
use crate::error::RideResult;
use crate::ride::{Participation, ParticipationState, UserProfile};

#[derive(Clone)]
pub struct ParticipationStore {
    db: Database,
}

impl ParticipationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Move a user into `state`, refreshing their profile snapshot.
    ///
    /// Returns whether the user's state changed; repeating the same state
    /// is a no-op apart from the snapshot refresh.
    pub fn set_participation(
        &self,
        ride_id: &str,
        profile: &UserProfile,
        state: ParticipationState,
    ) -> RideResult<bool> {
        let changed = self.db.set_participation(ride_id, profile, state)?;
        tracing::info!(
            ride_id,
            user_id = profile.user_id,
            state = %state,
            changed,
            "Participation set"
        );
        Ok(changed)
    }

    pub fn participation(&self, ride_id: &str) -> RideResult<Participation> {
        Ok(self.db.get_participation(ride_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RideError;
    use crate::repository::RideRepository;
    use crate::testing::draft;
    use proptest::prelude::*;

    fn setup() -> (ParticipationStore, String) {
        let db = Database::open_in_memory().unwrap();
        let repo = RideRepository::new(db.clone());
        let ride = repo.create(&draft("Loop"), 1).unwrap();
        (ParticipationStore::new(db), ride.id)
    }

    #[test]
    fn test_set_moves_user_between_sets() {
        let (store, ride_id) = setup();
        let user = UserProfile::new(7).with_name("Sam", None);

        assert!(store
            .set_participation(&ride_id, &user, ParticipationState::Joined)
            .unwrap());
        assert!(store
            .set_participation(&ride_id, &user, ParticipationState::Thinking)
            .unwrap());

        let participation = store.participation(&ride_id).unwrap();
        assert_eq!(participation.count(ParticipationState::Joined), 0);
        assert_eq!(participation.count(ParticipationState::Thinking), 1);
        assert_eq!(participation.state_of(7), Some(ParticipationState::Thinking));
    }

    #[test]
    fn test_repeated_state_is_idempotent_and_refreshes_profile() {
        let (store, ride_id) = setup();
        let before = UserProfile::new(7).with_name("Sam", None);
        let after = UserProfile::new(7).with_name("Samantha", Some("Lee"));

        assert!(store
            .set_participation(&ride_id, &before, ParticipationState::Joined)
            .unwrap());
        assert!(!store
            .set_participation(&ride_id, &after, ParticipationState::Joined)
            .unwrap());

        let participation = store.participation(&ride_id).unwrap();
        assert_eq!(participation.joined.len(), 1);
        assert_eq!(participation.joined[0].profile.display_name(), "Samantha Lee");
    }

    #[test]
    fn test_unknown_ride_is_not_found() {
        let (store, _) = setup();
        let err = store
            .set_participation("00000000000", &UserProfile::new(1), ParticipationState::Joined)
            .unwrap_err();
        assert!(matches!(err, RideError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sets_converge_to_one_membership() {
        let (store, ride_id) = setup();
        let user = UserProfile::new(7);

        let mut tasks = Vec::new();
        for i in 0..30 {
            let store = store.clone();
            let ride_id = ride_id.clone();
            let user = user.clone();
            let state = ParticipationState::ALL[i % 3];
            tasks.push(tokio::task::spawn_blocking(move || {
                store.set_participation(&ride_id, &user, state)
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let participation = store.participation(&ride_id).unwrap();
        assert_eq!(participation.memberships(7), 1);
        assert!(participation.state_of(7).is_some());
    }

    fn state_strategy() -> impl Strategy<Value = ParticipationState> {
        prop_oneof![
            Just(ParticipationState::Joined),
            Just(ParticipationState::Thinking),
            Just(ParticipationState::Skipped),
        ]
    }

    proptest! {
        #[test]
        fn prop_user_is_in_exactly_one_set(
            ops in proptest::collection::vec((1i64..4, state_strategy()), 1..25)
        ) {
            let (store, ride_id) = setup();
            for (user_id, state) in ops {
                store.set_participation(&ride_id, &UserProfile::new(user_id), state).unwrap();
                let participation = store.participation(&ride_id).unwrap();
                prop_assert_eq!(participation.memberships(user_id), 1);
                prop_assert_eq!(participation.state_of(user_id), Some(state));
                for other in 1i64..4 {
                    prop_assert!(participation.memberships(other) <= 1);
                }
            }
        }
    }
}
