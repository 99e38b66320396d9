//! Link flow state machine.
//!
//! `Idle → TokenRequested → TokenReady → WidgetOpen → Exchanging → Linked → Idle`,
//! with `Error` as the per-attempt failure state. Every transition takes the
//! current flow by reference and returns the next one, so a rejected
//! transition leaves the caller's state untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared::domain::{ItemId, LinkToken, User, UserId};
use tracing::debug;

use crate::{error::LinkError, items::ItemRegistry, widget::WidgetError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    #[default]
    Normal,
    Update,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "cause", rename_all = "snake_case")]
pub enum FlowPhase {
    #[default]
    Idle,
    TokenRequested,
    TokenReady,
    WidgetOpen,
    Exchanging,
    Linked,
    Error(String),
}

impl FlowPhase {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TokenRequested => "token_requested",
            Self::TokenReady => "token_ready",
            Self::WidgetOpen => "widget_open",
            Self::Exchanging => "exchanging",
            Self::Linked => "linked",
            Self::Error(_) => "error",
        }
    }

    /// A token request, widget presentation or exchange is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::TokenRequested | Self::TokenReady | Self::WidgetOpen | Self::Exchanging
        )
    }
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSession {
    pub mode: LinkMode,
    pub token: Option<LinkToken>,
    pub selected_item_id: Option<ItemId>,
}

/// Arguments of the backend token request derived from the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub user_id: UserId,
    pub item_id: Option<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFlow {
    phase: FlowPhase,
    session: LinkSession,
    last_linked: Option<ItemId>,
}

impl LinkFlow {
    pub fn phase(&self) -> &FlowPhase {
        &self.phase
    }

    pub fn session(&self) -> &LinkSession {
        &self.session
    }

    pub fn mode(&self) -> LinkMode {
        self.session.mode
    }

    pub fn token(&self) -> Option<&LinkToken> {
        self.session.token.as_ref()
    }

    pub fn selected_item_id(&self) -> Option<&ItemId> {
        self.session.selected_item_id.as_ref()
    }

    /// Item id produced by the most recent successful exchange.
    pub fn last_linked(&self) -> Option<&ItemId> {
        self.last_linked.as_ref()
    }

    /// Whether the "request token" action should be offered at all.
    pub fn can_request_token(&self) -> bool {
        !self.phase.is_busy()
            && (self.session.mode == LinkMode::Normal || self.session.selected_item_id.is_some())
    }

    /// Rejects changes to the link target (mode, item, user) while an attempt
    /// is in flight.
    pub fn ensure_settled(&self) -> Result<(), LinkError> {
        if self.phase.is_busy() {
            return Err(LinkError::FlowBusy {
                phase: self.phase.clone(),
            });
        }
        Ok(())
    }

    /// Changing mode or selection drops a token still held from a failed
    /// attempt, since it was issued for the previous target.
    pub fn set_mode(&self, mode: LinkMode, items: &ItemRegistry) -> Result<Self, LinkError> {
        self.ensure_settled()?;
        let mut next = self.clone();
        match mode {
            LinkMode::Normal => next.session.selected_item_id = None,
            LinkMode::Update if items.is_empty() => return Err(LinkError::NoLinkedItems),
            LinkMode::Update => {}
        }
        next.session.mode = mode;
        Ok(next.retarget(self))
    }

    pub fn select_item(&self, item_id: ItemId, items: &ItemRegistry) -> Result<Self, LinkError> {
        self.ensure_settled()?;
        if self.session.mode != LinkMode::Update {
            return Err(LinkError::NotInUpdateMode);
        }
        if !items.contains(&item_id) {
            return Err(LinkError::UnknownItem(item_id));
        }
        let mut next = self.clone();
        next.session.selected_item_id = Some(item_id);
        Ok(next.retarget(self))
    }

    /// The acting user is about to change.
    pub fn user_changed(&self) -> Result<Self, LinkError> {
        self.ensure_settled()?;
        let mut next = self.clone();
        next.session.token = None;
        Ok(next)
    }

    /// Validates every precondition of a token request and moves to
    /// `TokenRequested`. A flow in `Error` starts a fresh attempt.
    pub fn begin_token_request(
        &self,
        user: Option<&User>,
        items: &ItemRegistry,
    ) -> Result<(Self, TokenRequest), LinkError> {
        self.ensure_settled()?;
        let user = user.ok_or(LinkError::NoActiveUser)?;
        let item_id = match self.session.mode {
            LinkMode::Normal => None,
            LinkMode::Update => {
                let item_id = self
                    .session
                    .selected_item_id
                    .clone()
                    .ok_or(LinkError::MissingUpdateTarget)?;
                if !items.contains(&item_id) {
                    return Err(LinkError::UnknownItem(item_id));
                }
                Some(item_id)
            }
        };

        let mut next = self.clone();
        next.phase = FlowPhase::TokenRequested;
        next.session.token = None;
        next.last_linked = None;
        Ok((
            next,
            TokenRequest {
                user_id: user.id,
                item_id,
            },
        ))
    }

    pub fn token_issued(&self, token: LinkToken) -> Result<Self, LinkError> {
        self.expect_phase(&FlowPhase::TokenRequested, "accept a link token")?;
        let mut next = self.clone();
        next.phase = FlowPhase::TokenReady;
        next.session.token = Some(token);
        Ok(next)
    }

    pub fn token_failed(&self, cause: impl Into<String>) -> Result<Self, LinkError> {
        self.expect_phase(&FlowPhase::TokenRequested, "record a token failure")?;
        let mut next = self.clone();
        next.phase = FlowPhase::Error(cause.into());
        Ok(next)
    }

    /// Hands the held token to the widget. A flow that failed after the token
    /// was issued may reopen the widget with the same token.
    pub fn open_widget(&self) -> Result<(Self, LinkToken), LinkError> {
        let reopenable = matches!(self.phase, FlowPhase::TokenReady | FlowPhase::Error(_));
        let token = match (&self.session.token, reopenable) {
            (Some(token), true) => token.clone(),
            _ => {
                return Err(LinkError::InvalidTransition {
                    action: "open the widget",
                    phase: self.phase.clone(),
                })
            }
        };
        let mut next = self.clone();
        next.phase = FlowPhase::WidgetOpen;
        Ok((next, token))
    }

    pub fn begin_exchange(&self, user: Option<&User>) -> Result<(Self, UserId), LinkError> {
        self.expect_phase(&FlowPhase::WidgetOpen, "exchange a public token")?;
        let user = user.ok_or(LinkError::NoActiveUser)?;
        let mut next = self.clone();
        next.phase = FlowPhase::Exchanging;
        Ok((next, user.id))
    }

    /// Records the linked item and re-arms the flow: mode back to Normal,
    /// selection and token cleared, phase back to `Idle`.
    pub fn exchange_succeeded(&self, item_id: ItemId) -> Result<Self, LinkError> {
        self.expect_phase(&FlowPhase::Exchanging, "complete an exchange")?;
        let mut linked = self.clone();
        linked.phase = FlowPhase::Linked;
        linked.session = LinkSession::default();
        linked.last_linked = Some(item_id);
        debug!("link: flow linked item={:?}, re-arming", linked.last_linked);
        linked.rearm()
    }

    pub fn exchange_failed(&self, cause: impl Into<String>) -> Result<Self, LinkError> {
        self.expect_phase(&FlowPhase::Exchanging, "record an exchange failure")?;
        let mut next = self.clone();
        next.phase = FlowPhase::Error(cause.into());
        Ok(next)
    }

    /// A widget exit without error is a user cancel: the token is dropped,
    /// mode and selection stay.
    pub fn widget_exited(&self, error: Option<&WidgetError>) -> Result<Self, LinkError> {
        if !matches!(self.phase, FlowPhase::WidgetOpen | FlowPhase::TokenReady) {
            return Err(LinkError::InvalidTransition {
                action: "close the widget",
                phase: self.phase.clone(),
            });
        }
        let mut next = self.clone();
        match error {
            Some(error) => next.phase = FlowPhase::Error(error.to_string()),
            None => {
                next.phase = FlowPhase::Idle;
                next.session.token = None;
            }
        }
        Ok(next)
    }

    /// Forces the flow back to `Idle` from any phase.
    pub fn reset(&self) -> Self {
        let mut next = self.clone();
        next.phase = FlowPhase::Idle;
        next.session.token = None;
        next
    }

    fn retarget(mut self, previous: &Self) -> Self {
        if self.session.mode != previous.session.mode
            || self.session.selected_item_id != previous.session.selected_item_id
        {
            self.session.token = None;
        }
        self
    }

    fn rearm(&self) -> Result<Self, LinkError> {
        self.expect_phase(&FlowPhase::Linked, "re-arm")?;
        let mut next = self.clone();
        next.phase = FlowPhase::Idle;
        Ok(next)
    }

    fn expect_phase(&self, expected: &FlowPhase, action: &'static str) -> Result<(), LinkError> {
        if &self.phase == expected {
            Ok(())
        } else {
            Err(LinkError::InvalidTransition {
                action,
                phase: self.phase.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::Item;

    use super::*;

    fn alice() -> User {
        User {
            id: UserId(7),
            username: "alice".into(),
        }
    }

    fn registry_with(ids: &[&str]) -> ItemRegistry {
        ids.iter().fold(ItemRegistry::default(), |registry, id| {
            registry
                .add_item(Item {
                    id: ItemId::new(*id),
                    institution: "Bank".into(),
                    accounts: Vec::new(),
                })
                .0
        })
    }

    fn ready_flow() -> LinkFlow {
        let (flow, _) = LinkFlow::default()
            .begin_token_request(Some(&alice()), &ItemRegistry::default())
            .expect("request");
        flow.token_issued(LinkToken::new("link-sandbox-abc"))
            .expect("issued")
    }

    #[test]
    fn normal_mode_always_clears_selection() {
        let items = registry_with(&["item-7"]);
        let flow = LinkFlow::default()
            .set_mode(LinkMode::Update, &items)
            .and_then(|f| f.select_item(ItemId::new("item-7"), &items))
            .expect("select");
        assert_eq!(flow.selected_item_id(), Some(&ItemId::new("item-7")));

        let normal = flow.set_mode(LinkMode::Normal, &items).expect("normal");
        assert_eq!(normal.selected_item_id(), None);
        let normal_again = normal.set_mode(LinkMode::Normal, &items).expect("normal");
        assert_eq!(normal_again.selected_item_id(), None);
    }

    #[test]
    fn update_mode_needs_items_and_does_not_auto_select() {
        assert!(matches!(
            LinkFlow::default().set_mode(LinkMode::Update, &ItemRegistry::default()),
            Err(LinkError::NoLinkedItems)
        ));

        let items = registry_with(&["a", "b"]);
        let flow = LinkFlow::default()
            .set_mode(LinkMode::Update, &items)
            .expect("update");
        assert_eq!(flow.mode(), LinkMode::Update);
        assert_eq!(flow.selected_item_id(), None);
        assert!(!flow.can_request_token());
    }

    #[test]
    fn select_item_requires_update_mode_and_known_item() {
        let items = registry_with(&["a"]);
        assert!(matches!(
            LinkFlow::default().select_item(ItemId::new("a"), &items),
            Err(LinkError::NotInUpdateMode)
        ));
        let update = LinkFlow::default()
            .set_mode(LinkMode::Update, &items)
            .expect("update");
        assert!(matches!(
            update.select_item(ItemId::new("zz"), &items),
            Err(LinkError::UnknownItem(_))
        ));
    }

    #[test]
    fn token_request_requires_active_user() {
        assert!(matches!(
            LinkFlow::default().begin_token_request(None, &ItemRegistry::default()),
            Err(LinkError::NoActiveUser)
        ));
    }

    #[test]
    fn update_request_without_selection_is_rejected() {
        let items = registry_with(&["a"]);
        let flow = LinkFlow::default()
            .set_mode(LinkMode::Update, &items)
            .expect("update");
        assert!(matches!(
            flow.begin_token_request(Some(&alice()), &items),
            Err(LinkError::MissingUpdateTarget)
        ));
        assert_eq!(flow.phase(), &FlowPhase::Idle);
    }

    #[test]
    fn update_request_carries_selected_item() {
        let items = registry_with(&["item-7"]);
        let flow = LinkFlow::default()
            .set_mode(LinkMode::Update, &items)
            .and_then(|f| f.select_item(ItemId::new("item-7"), &items))
            .expect("select");
        let (next, request) = flow
            .begin_token_request(Some(&alice()), &items)
            .expect("request");
        assert_eq!(next.phase(), &FlowPhase::TokenRequested);
        assert_eq!(
            request,
            TokenRequest {
                user_id: UserId(7),
                item_id: Some(ItemId::new("item-7")),
            }
        );
    }

    #[test]
    fn second_request_while_outstanding_is_busy() {
        let (requested, _) = LinkFlow::default()
            .begin_token_request(Some(&alice()), &ItemRegistry::default())
            .expect("request");
        assert!(matches!(
            requested.begin_token_request(Some(&alice()), &ItemRegistry::default()),
            Err(LinkError::FlowBusy {
                phase: FlowPhase::TokenRequested
            })
        ));
        assert!(matches!(
            ready_flow().begin_token_request(Some(&alice()), &ItemRegistry::default()),
            Err(LinkError::FlowBusy {
                phase: FlowPhase::TokenReady
            })
        ));
    }

    #[test]
    fn target_is_locked_while_an_attempt_is_in_flight() {
        let items = registry_with(&["item-7"]);
        let ready = ready_flow();
        assert!(matches!(
            ready.set_mode(LinkMode::Update, &items),
            Err(LinkError::FlowBusy {
                phase: FlowPhase::TokenReady
            })
        ));
        assert!(matches!(
            ready.user_changed(),
            Err(LinkError::FlowBusy { .. })
        ));

        let (open, _) = ready.open_widget().expect("open");
        assert!(matches!(
            open.set_mode(LinkMode::Normal, &items),
            Err(LinkError::FlowBusy {
                phase: FlowPhase::WidgetOpen
            })
        ));

        let (exchanging, _) = open.begin_exchange(Some(&alice())).expect("exchange");
        assert!(matches!(
            exchanging.select_item(ItemId::new("item-7"), &items),
            Err(LinkError::FlowBusy {
                phase: FlowPhase::Exchanging
            })
        ));
    }

    #[test]
    fn retargeting_after_a_failure_drops_the_held_token() {
        let items = registry_with(&["item-7"]);
        let (open, _) = ready_flow().open_widget().expect("open");
        let (exchanging, _) = open.begin_exchange(Some(&alice())).expect("exchange");
        let failed = exchanging.exchange_failed("bad token").expect("failed");

        let same_mode = failed.set_mode(LinkMode::Normal, &items).expect("normal");
        assert!(same_mode.token().is_some());

        let update = failed.set_mode(LinkMode::Update, &items).expect("update");
        assert_eq!(update.token(), None);
        assert!(update.open_widget().is_err());

        let other_user = failed.user_changed().expect("user change");
        assert_eq!(other_user.token(), None);
        assert_eq!(other_user.phase(), failed.phase());
    }

    #[test]
    fn error_phase_allows_a_fresh_request() {
        let (requested, _) = LinkFlow::default()
            .begin_token_request(Some(&alice()), &ItemRegistry::default())
            .expect("request");
        let failed = requested.token_failed("boom").expect("failed");
        assert_eq!(failed.phase(), &FlowPhase::Error("boom".into()));
        assert!(failed.can_request_token());

        let (retry, _) = failed
            .begin_token_request(Some(&alice()), &ItemRegistry::default())
            .expect("retry");
        assert_eq!(retry.phase(), &FlowPhase::TokenRequested);
    }

    #[test]
    fn open_widget_requires_a_ready_token() {
        assert!(matches!(
            LinkFlow::default().open_widget(),
            Err(LinkError::InvalidTransition { .. })
        ));
        let (open, token) = ready_flow().open_widget().expect("open");
        assert_eq!(open.phase(), &FlowPhase::WidgetOpen);
        assert_eq!(token.expose(), "link-sandbox-abc");
    }

    #[test]
    fn successful_exchange_rearms_the_flow() {
        let items = registry_with(&["item-7"]);
        let flow = LinkFlow::default()
            .set_mode(LinkMode::Update, &items)
            .and_then(|f| f.select_item(ItemId::new("item-7"), &items))
            .and_then(|f| f.begin_token_request(Some(&alice()), &items).map(|(f, _)| f))
            .and_then(|f| f.token_issued(LinkToken::new("tok")))
            .and_then(|f| f.open_widget().map(|(f, _)| f))
            .and_then(|f| f.begin_exchange(Some(&alice())).map(|(f, _)| f))
            .expect("exchanging");

        let done = flow
            .exchange_succeeded(ItemId::new("item-8"))
            .expect("linked");
        assert_eq!(done.phase(), &FlowPhase::Idle);
        assert_eq!(done.mode(), LinkMode::Normal);
        assert_eq!(done.selected_item_id(), None);
        assert_eq!(done.token(), None);
        assert_eq!(done.last_linked(), Some(&ItemId::new("item-8")));
    }

    #[test]
    fn failed_exchange_keeps_token_and_mode() {
        let (open, _) = ready_flow().open_widget().expect("open");
        let (exchanging, user_id) = open.begin_exchange(Some(&alice())).expect("exchange");
        assert_eq!(user_id, UserId(7));

        let failed = exchanging.exchange_failed("bad token").expect("failed");
        assert_eq!(failed.phase(), &FlowPhase::Error("bad token".into()));
        assert_eq!(failed.token().map(LinkToken::expose), Some("link-sandbox-abc"));
        assert_eq!(failed.mode(), LinkMode::Normal);

        let (reopened, _) = failed.open_widget().expect("reopen with same token");
        assert_eq!(reopened.phase(), &FlowPhase::WidgetOpen);
    }

    #[test]
    fn widget_success_is_only_valid_from_open_widget() {
        assert!(matches!(
            ready_flow().begin_exchange(Some(&alice())),
            Err(LinkError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancel_clears_token_but_error_exit_keeps_it() {
        let (open, _) = ready_flow().open_widget().expect("open");

        let cancelled = open.widget_exited(None).expect("cancel");
        assert_eq!(cancelled.phase(), &FlowPhase::Idle);
        assert_eq!(cancelled.token(), None);

        let errored = open
            .widget_exited(Some(&WidgetError::new("institution down")))
            .expect("exit");
        assert_eq!(errored.phase(), &FlowPhase::Error("institution down".into()));
        assert!(errored.token().is_some());

        let from_ready = ready_flow().widget_exited(None).expect("exit from ready");
        assert_eq!(from_ready.phase(), &FlowPhase::Idle);

        assert!(LinkFlow::default().widget_exited(None).is_err());
    }

    #[test]
    fn reset_returns_to_idle_from_any_phase() {
        let (requested, _) = LinkFlow::default()
            .begin_token_request(Some(&alice()), &ItemRegistry::default())
            .expect("request");
        let reset = requested.reset();
        assert_eq!(reset.phase(), &FlowPhase::Idle);
        assert!(reset.token().is_none());

        // A response that arrives after a reset is refused.
        assert!(reset.token_issued(LinkToken::new("late")).is_err());
    }

    #[test]
    fn flow_snapshot_serializes_phase_with_cause() {
        let (requested, _) = LinkFlow::default()
            .begin_token_request(Some(&alice()), &ItemRegistry::default())
            .expect("request");
        let failed = requested.token_failed("boom").expect("failed");
        let json = serde_json::to_value(&failed).expect("encode");
        assert_eq!(json["phase"], serde_json::json!({"phase": "error", "cause": "boom"}));
        assert_eq!(json["session"]["mode"], "normal");
    }
}
