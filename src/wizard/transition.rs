//! Pure wizard transition function
//!
//! Given the same state, context and event it always produces the same new
//! state and effects; all I/O happens in the engine.

use super::effect::WizardEffect;
use super::event::{WizardAction, WizardEvent};
use super::state::{ConversationState, WizardContext, WizardMode};
use super::step::{compute_next_step, previous_step, Step};
use crate::fields::{ensure_upcoming, is_clear_token, Field};
use crate::ride::MessageHandle;
use crate::route::{is_recognized_provider, RouteInfo};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<WizardEffect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: WizardEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Events the current step does not accept
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Still checking the route link, one moment please")]
    RoutePending,
    #[error("This is the first step")]
    AtFirstStep,
    #[error("The {0} cannot be skipped")]
    NotSkippable(&'static str),
    #[error("There is no {0} to keep")]
    NothingToKeep(&'static str),
    #[error("Use the buttons below to confirm, go back or cancel")]
    TextAtConfirm,
    #[error("Fill in the remaining steps before confirming")]
    NotAtConfirm,
    #[error("Route result for {0} is no longer wanted")]
    StaleRouteResult(String),
}

pub fn transition(
    state: &ConversationState,
    context: &WizardContext,
    event: WizardEvent,
) -> Result<TransitionResult, TransitionError> {
    match event {
        WizardEvent::Action(WizardAction::Cancel) => Ok(TransitionResult::new(state.clone())
            .with_effect(WizardEffect::Close {
                notice: "Cancelled".to_string(),
            })),

        WizardEvent::RouteInspected { url, info } => on_route_inspected(state, &url, info),

        _ if state.pending_route.is_some() => Err(TransitionError::RoutePending),

        WizardEvent::Text { text, message } => on_text(state, context, &text, message),

        WizardEvent::Action(action) => on_action(state, context, action),
    }
}

fn on_text(
    state: &ConversationState,
    context: &WizardContext,
    text: &str,
    message: Option<MessageHandle>,
) -> Result<TransitionResult, TransitionError> {
    let step = state.step;
    let Some(field) = step.field() else {
        return Err(TransitionError::TextAtConfirm);
    };
    let mut next = state.clone();

    if is_clear_token(text) {
        if !step.is_clearable() {
            return Ok(reject_input(
                state,
                message,
                format!("The {} cannot be cleared", field.label()),
            ));
        }
        next.draft.clear(field);
        if step == Step::Route {
            next.route_info = None;
        }
        return Ok(advance(next, message));
    }

    let value = match field.parse(text, context.now) {
        Ok(value) => value,
        Err(e) => return Ok(reject_input(state, message, e.message)),
    };
    next.draft.apply(field, value);

    if field == Field::Route {
        next.route_info = None;
        if let Some(url) = next
            .draft
            .route_link
            .clone()
            .filter(|url| is_recognized_provider(url))
        {
            next.pending_route = Some(url.clone());
            let handles = take_stale(&mut next, message);
            let mut result = TransitionResult::new(next);
            if !handles.is_empty() {
                result = result.with_effect(WizardEffect::DeleteMessages { handles });
            }
            return Ok(result
                .with_effect(WizardEffect::show())
                .with_effect(WizardEffect::InspectRoute { url }));
        }
    }
    Ok(advance(next, message))
}

fn on_action(
    state: &ConversationState,
    context: &WizardContext,
    action: WizardAction,
) -> Result<TransitionResult, TransitionError> {
    let step = state.step;
    let next = state.clone();

    match action {
        WizardAction::Back => {
            let previous = previous_step(step).ok_or(TransitionError::AtFirstStep)?;
            Ok(move_to(next, previous, None))
        }
        WizardAction::Skip => {
            if !step.is_skippable() {
                return Err(TransitionError::NotSkippable(step_label(step)));
            }
            Ok(advance(next, None))
        }
        WizardAction::Keep => {
            let has_value = step.field().is_some_and(|f| state.draft.has_value(f));
            if !has_value {
                return Err(TransitionError::NothingToKeep(step_label(step)));
            }
            // Updates may keep a historic date; new rides must be upcoming
            if step == Step::Date && !matches!(state.mode, WizardMode::Update { .. }) {
                if let Some(date) = state.draft.date {
                    if let Err(e) = ensure_upcoming(date, context.now) {
                        return Ok(reject_input(state, None, e.message));
                    }
                }
            }
            Ok(advance(next, None))
        }
        WizardAction::Confirm => {
            if step != Step::Confirm {
                return Err(TransitionError::NotAtConfirm);
            }
            match state.draft.complete() {
                Ok(_) => Ok(TransitionResult::new(next).with_effect(WizardEffect::Commit)),
                Err(e) => Ok(TransitionResult::new(next).with_effect(WizardEffect::show_error(e.message))),
            }
        }
        WizardAction::Cancel => Ok(TransitionResult::new(next).with_effect(WizardEffect::Close {
            notice: "Cancelled".to_string(),
        })),
    }
}

fn on_route_inspected(
    state: &ConversationState,
    url: &str,
    info: Option<RouteInfo>,
) -> Result<TransitionResult, TransitionError> {
    if state.pending_route.as_deref() != Some(url) || state.step != Step::Route {
        return Err(TransitionError::StaleRouteResult(url.to_string()));
    }
    let mut next = state.clone();
    next.pending_route = None;

    if let Some(info) = info.filter(|i| !i.is_empty()) {
        if let Some(km) = info.distance_km {
            next.draft.distance_km = Some(km);
        }
        if let Some(minutes) = info.duration_min {
            next.draft.duration_min = Some(minutes);
        }
        next.route_info = Some(info);
    }
    Ok(advance(next, None))
}

/// Stay on the step, remember the input for deletion and show the error
fn reject_input(
    state: &ConversationState,
    message: Option<MessageHandle>,
    error: String,
) -> TransitionResult {
    let mut next = state.clone();
    next.stale.extend(message);
    TransitionResult::new(next).with_effect(WizardEffect::show_error(error))
}

fn advance(next: ConversationState, message: Option<MessageHandle>) -> TransitionResult {
    let derived = next.route_info;
    let target = compute_next_step(next.step, &next.draft, derived.as_ref());
    move_to(next, target, message)
}

fn move_to(
    mut next: ConversationState,
    step: Step,
    message: Option<MessageHandle>,
) -> TransitionResult {
    next.step = step;
    let handles = take_stale(&mut next, message);
    let mut result = TransitionResult::new(next);
    if !handles.is_empty() {
        result = result.with_effect(WizardEffect::DeleteMessages { handles });
    }
    result.with_effect(WizardEffect::show())
}

fn take_stale(state: &mut ConversationState, message: Option<MessageHandle>) -> Vec<MessageHandle> {
    let mut handles = std::mem::take(&mut state.stale);
    handles.extend(message);
    handles
}

fn step_label(step: Step) -> &'static str {
    step.field().map_or("confirmation", Field::label)
}
