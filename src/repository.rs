//! Ride repository
//!
//! CRUD over rides with creator-only mutation, plus the parameter-block
//! entry points used by commands that skip the wizard.

use crate::db::{Database, RidePage};
use crate::error::{RideError, RideResult};
use crate::fields::{is_clear_token, Field, FieldError};
use crate::ride::{generate_ride_id, MessageHandle, Participation, Ride, RideDraft};
use chrono::{DateTime, Local, Utc};

/// Parameter key that names the ride a command refers to
pub const ID_PARAM: &str = "id";

#[derive(Clone)]
pub struct RideRepository {
    db: Database,
}

impl RideRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, draft: &RideDraft, creator: i64) -> RideResult<Ride> {
        let details = draft.complete()?;
        let now = Utc::now();
        let ride = Ride {
            id: generate_ride_id(),
            details,
            cancelled: false,
            created_by: creator,
            updated_by: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            participation: Participation::default(),
        };
        self.db.insert_ride(&ride)?;
        tracing::info!(ride_id = %ride.id, creator, title = %ride.details.title, "Ride created");
        Ok(ride)
    }

    pub fn get(&self, id: &str) -> RideResult<Ride> {
        Ok(self.db.get_ride(id)?)
    }

    /// Replace every editable field of a ride at once
    pub fn update(&self, id: &str, draft: &RideDraft, actor: i64) -> RideResult<Ride> {
        self.authorize(id, actor, "update")?;
        let details = draft.complete()?;
        let ride = self.db.replace_ride_details(id, &details, actor)?;
        tracing::info!(ride_id = id, actor, "Ride updated");
        Ok(ride)
    }

    pub fn set_cancelled(&self, id: &str, cancelled: bool, actor: i64) -> RideResult<Ride> {
        let action = if cancelled { "cancel" } else { "resume" };
        let ride = self.authorize(id, actor, action)?;
        if ride.cancelled == cancelled {
            return Ok(ride);
        }
        let ride = self.db.set_cancelled(id, cancelled, actor)?;
        tracing::info!(ride_id = id, actor, cancelled, "Ride cancellation changed");
        Ok(ride)
    }

    /// Hard delete; chat messages already sent are left in place
    pub fn delete(&self, id: &str, actor: i64) -> RideResult<Ride> {
        let ride = self.authorize(id, actor, "delete")?;
        self.db.delete_ride(id)?;
        tracing::info!(ride_id = id, actor, "Ride deleted");
        Ok(ride)
    }

    /// Rides created by a user, newest scheduled date first
    pub fn list_by_creator(&self, user_id: i64, skip: u64, limit: u64) -> RideResult<RidePage> {
        Ok(self.db.list_rides_by_creator(user_id, skip, limit)?)
    }

    pub fn add_message(&self, id: &str, handle: MessageHandle) -> RideResult<()> {
        Ok(self.db.add_ride_message(id, handle)?)
    }

    pub fn replace_messages(&self, id: &str, handles: &[MessageHandle]) -> RideResult<()> {
        Ok(self.db.replace_ride_messages(id, handles)?)
    }

    // ==================== Parameter Entry Points ====================

    pub fn create_from_parameters(
        &self,
        params: &[(String, String)],
        creator: i64,
    ) -> RideResult<Ride> {
        let mut draft = RideDraft::default();
        apply_parameters(&mut draft, params, Local::now(), false)?;
        self.create(&draft, creator)
    }

    pub fn update_from_parameters(
        &self,
        id: &str,
        params: &[(String, String)],
        actor: i64,
    ) -> RideResult<Ride> {
        let ride = self.authorize(id, actor, "update")?;
        let mut draft = RideDraft::from_details(&ride.details);
        apply_parameters(&mut draft, params, Local::now(), true)?;
        self.update(id, &draft, actor)
    }

    /// Create a copy of an existing ride with the given parameters applied
    pub fn duplicate_from_parameters(
        &self,
        source_id: &str,
        params: &[(String, String)],
        creator: i64,
    ) -> RideResult<Ride> {
        let source = self.get(source_id)?;
        let mut draft = RideDraft::from_details(&source.details);
        apply_parameters(&mut draft, params, Local::now(), true)?;
        self.create(&draft, creator)
    }

    fn authorize(&self, id: &str, actor: i64, action: &'static str) -> RideResult<Ride> {
        let ride = self.get(id)?;
        if !ride.is_creator(actor) {
            tracing::warn!(ride_id = id, actor, action, "Rejected mutation by non-creator");
            return Err(RideError::permission_denied(id, action));
        }
        Ok(ride)
    }
}

/// Apply `key: value` parameters to a draft with the wizard's validators.
///
/// `-` and blank both erase a field when editing an existing ride; when
/// creating, blank leaves the field unset. Required fields cannot be
/// erased. The `id` key is the ride reference and is ignored here.
pub fn apply_parameters(
    draft: &mut RideDraft,
    params: &[(String, String)],
    now: DateTime<Local>,
    editing: bool,
) -> Result<(), FieldError> {
    for (key, value) in params {
        if key.eq_ignore_ascii_case(ID_PARAM) {
            continue;
        }
        let field = Field::from_param_key(key)
            .ok_or_else(|| FieldError::new(format!("Unknown parameter: {key}")))?;

        let erase = value.trim().is_empty() || is_clear_token(value);
        if erase {
            if field.is_required() {
                return Err(FieldError::new(format!(
                    "The {} cannot be cleared",
                    field.label()
                )));
            }
            if editing || !value.trim().is_empty() {
                draft.clear(field);
            }
            continue;
        }
        draft.apply(field, field.parse(value, now)?);
    }
    Ok(())
}
