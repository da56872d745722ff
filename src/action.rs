//! Actions: tagged intents dispatched to a reducer, plus the
//! private/public tuple shape and the checked-action types used during
//! reconciliation.

use serde::{Deserialize, Serialize};

/// A tagged intent to transition state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Action {
    pub fn new(r#type: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            r#type: r#type.into(),
            payload,
        }
    }
}

/// Either a single public action, or a `(private, public)` pair where the
/// local peer applies the private half and other peers only ever see the
/// public half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionOrActionTuple {
    Single(Action),
    Tuple(Box<Action>, Box<Action>),
}

impl ActionOrActionTuple {
    /// The action the local peer actually applies to its own reducer: the
    /// private half of a tuple, or the action itself.
    pub fn local_action(&self) -> &Action {
        match self {
            ActionOrActionTuple::Single(action) => action,
            ActionOrActionTuple::Tuple(private, _public) => private,
        }
    }

    /// The action that should ever be transmitted to other peers: the
    /// public half of a tuple, or the action itself.
    pub fn public_action(&self) -> &Action {
        match self {
            ActionOrActionTuple::Single(action) => action,
            ActionOrActionTuple::Tuple(_private, public) => public,
        }
    }
}

impl From<Action> for ActionOrActionTuple {
    fn from(action: Action) -> Self {
        ActionOrActionTuple::Single(action)
    }
}

/// An action accompanied by the expected post-apply checksum, as computed
/// by the authoritative sender (the master).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckedAction {
    pub action: Action,
    pub checksum: String,
}

/// An ordered, finite batch of [`CheckedAction`]s with a final expected
/// checksum, applied atomically by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliatoryActions {
    pub actions: Vec<CheckedAction>,
    pub final_checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_action_exposes_itself_for_both_halves() {
        let action = Action::new("inc", None);
        let wrapped = ActionOrActionTuple::from(action.clone());
        assert_eq!(wrapped.local_action(), &action);
        assert_eq!(wrapped.public_action(), &action);
    }

    #[test]
    fn tuple_separates_private_and_public_halves() {
        let private = Action::new("revealCard", Some(json!({"card": "A\u{2660}"})));
        let public = Action::new("revealCard", Some(json!({"card": "?"})));
        let tuple = ActionOrActionTuple::Tuple(Box::new(private.clone()), Box::new(public.clone()));
        assert_eq!(tuple.local_action(), &private);
        assert_eq!(tuple.public_action(), &public);
    }
}
