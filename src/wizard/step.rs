//! Wizard step graph

use crate::fields::Field;
use crate::ride::RideDraft;
use crate::route::RouteInfo;
use serde::{Deserialize, Serialize};

/// Position in the wizard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Title,
    Category,
    Organizer,
    Date,
    Route,
    Distance,
    Duration,
    Speed,
    MeetingPoint,
    Info,
    Confirm,
}

impl Step {
    pub const FIRST: Step = Step::Title;

    /// Steps that collect a field, in order
    pub const FIELD_STEPS: [Step; 10] = [
        Step::Title,
        Step::Category,
        Step::Organizer,
        Step::Date,
        Step::Route,
        Step::Distance,
        Step::Duration,
        Step::Speed,
        Step::MeetingPoint,
        Step::Info,
    ];

    pub fn field(self) -> Option<Field> {
        match self {
            Step::Title => Some(Field::Title),
            Step::Category => Some(Field::Category),
            Step::Organizer => Some(Field::Organizer),
            Step::Date => Some(Field::Date),
            Step::Route => Some(Field::Route),
            Step::Distance => Some(Field::Distance),
            Step::Duration => Some(Field::Duration),
            Step::Speed => Some(Field::Speed),
            Step::MeetingPoint => Some(Field::MeetingPoint),
            Step::Info => Some(Field::Info),
            Step::Confirm => None,
        }
    }

    pub fn is_required(self) -> bool {
        self.field().is_some_and(Field::is_required)
    }

    /// `-` erases the value
    pub fn is_clearable(self) -> bool {
        !matches!(self, Step::Title | Step::Category | Step::Date | Step::Confirm)
    }

    pub fn is_skippable(self) -> bool {
        !matches!(self, Step::Title | Step::Date | Step::Confirm)
    }

    /// 1-based position among the field steps
    pub fn number(self) -> Option<usize> {
        Step::FIELD_STEPS.iter().position(|&s| s == self).map(|i| i + 1)
    }

    fn following(self) -> Step {
        match self {
            Step::Title => Step::Category,
            Step::Category => Step::Organizer,
            Step::Organizer => Step::Date,
            Step::Date => Step::Route,
            Step::Route => Step::Distance,
            Step::Distance => Step::Duration,
            Step::Duration => Step::Speed,
            Step::Speed => Step::MeetingPoint,
            Step::MeetingPoint => Step::Info,
            Step::Info | Step::Confirm => Step::Confirm,
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Step::Title => "What is the title of the ride?",
            Step::Category => "Which kind of ride is it?",
            Step::Organizer => "Who is organizing the ride?",
            Step::Date => "When does the ride start? (e.g. \"tomorrow 9am\", \"sat 8:30\", \"2026-10-25 09:00\")",
            Step::Route => "Send a link to the route (Strava, Ride with GPS, Komoot, Garmin or any other link)",
            Step::Distance => "How long is the ride, in km?",
            Step::Duration => "How long will the ride take? (e.g. 90, 2h, 2h 30m)",
            Step::Speed => "What is the expected average speed? (e.g. 25-28, 25+, -28)",
            Step::MeetingPoint => "Where do riders meet?",
            Step::Info => "Anything else riders should know?",
            Step::Confirm => "Please check the ride details",
        }
    }
}

/// Next step after `step` has been completed.
///
/// Leaving `route` with data derived from the route page skips the steps
/// the page already answered: distance and duration jump to `speed`,
/// distance alone jumps to `duration`.
pub fn compute_next_step(step: Step, draft: &RideDraft, derived: Option<&RouteInfo>) -> Step {
    if step == Step::Route {
        if let Some(info) = derived {
            let has_distance = info.distance_km.is_some() && draft.distance_km.is_some();
            let has_duration = info.duration_min.is_some() && draft.duration_min.is_some();
            return match (has_distance, has_duration) {
                (true, true) => Step::Speed,
                (true, false) => Step::Duration,
                _ => Step::Distance,
            };
        }
    }
    step.following()
}

/// Static back edge of the step graph
pub fn previous_step(step: Step) -> Option<Step> {
    match step {
        Step::Title => None,
        Step::Category => Some(Step::Title),
        Step::Organizer => Some(Step::Category),
        Step::Date => Some(Step::Organizer),
        Step::Route => Some(Step::Date),
        Step::Distance => Some(Step::Route),
        Step::Duration => Some(Step::Distance),
        Step::Speed => Some(Step::Duration),
        Step::MeetingPoint => Some(Step::Speed),
        Step::Info => Some(Step::MeetingPoint),
        Step::Confirm => Some(Step::Info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_graph_reaches_confirm() {
        let draft = RideDraft::default();
        let mut step = Step::FIRST;
        let mut visited = vec![step];
        while step != Step::Confirm {
            step = compute_next_step(step, &draft, None);
            visited.push(step);
        }
        assert_eq!(visited.len(), 11);
        assert_eq!(&visited[..10], &Step::FIELD_STEPS);
    }

    #[test]
    fn test_back_edges_mirror_forward_edges() {
        let draft = RideDraft::default();
        for step in Step::FIELD_STEPS {
            let next = compute_next_step(step, &draft, None);
            assert_eq!(previous_step(next), Some(step));
        }
        assert_eq!(previous_step(Step::Title), None);
    }

    #[test]
    fn test_route_branch() {
        let mut draft = RideDraft {
            distance_km: Some(80.0),
            duration_min: Some(200),
            ..RideDraft::default()
        };
        let both = RouteInfo {
            distance_km: Some(80.0),
            duration_min: Some(200),
        };
        let distance_only = RouteInfo {
            distance_km: Some(80.0),
            duration_min: None,
        };

        assert_eq!(compute_next_step(Step::Route, &draft, Some(&both)), Step::Speed);
        assert_eq!(
            compute_next_step(Step::Route, &draft, Some(&distance_only)),
            Step::Duration
        );
        // Values already on the draft do not count without a derived result
        assert_eq!(compute_next_step(Step::Route, &draft, None), Step::Distance);

        draft.distance_km = None;
        assert_eq!(compute_next_step(Step::Route, &draft, Some(&both)), Step::Distance);
    }

    #[test]
    fn test_step_flags() {
        assert!(Step::Title.is_required());
        assert!(!Step::Title.is_skippable());
        assert!(!Step::Title.is_clearable());
        assert!(Step::Date.is_required());
        assert!(Step::Category.is_skippable());
        assert!(!Step::Category.is_clearable());
        for step in [Step::Organizer, Step::Route, Step::Distance, Step::Info] {
            assert!(step.is_clearable() && step.is_skippable());
        }
        assert_eq!(Step::Info.number(), Some(10));
        assert_eq!(Step::Confirm.number(), None);
    }
}
