use shared::{
    domain::{ItemId, UserId},
    error::ApiError,
};
use thiserror::Error;

use crate::{link_flow::FlowPhase, widget::WidgetError};

#[derive(Debug, Clone, Error)]
pub enum LinkError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("failed to create user: {0}")]
    UserResolution(#[source] ApiError),
    #[error("user {0} is not known to this session")]
    UnknownUser(UserId),
    #[error("please create or select a user first")]
    NoActiveUser,
    #[error("a link operation is already in progress (flow is {phase})")]
    FlowBusy { phase: FlowPhase },
    #[error("cannot {action} while flow is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: FlowPhase,
    },
    #[error("update mode needs at least one linked item")]
    NoLinkedItems,
    #[error("select an item to update first")]
    MissingUpdateTarget,
    #[error("items can only be selected in update mode")]
    NotInUpdateMode,
    #[error("item {0} is not linked")]
    UnknownItem(ItemId),
    #[error("failed to get link token: {0}")]
    TokenIssuance(#[source] ApiError),
    #[error("link closed with error: {0}")]
    Widget(#[source] WidgetError),
    #[error("failed to exchange token: {0}")]
    Exchange(#[source] ApiError),
    #[error("failed to load items: {0}")]
    ItemFetch(#[source] ApiError),
    #[error("failed to get transactions: {0}")]
    TransactionFetch(#[source] ApiError),
}

impl LinkError {
    /// Precondition failures are rejected locally and never reach the backend.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            Self::UserResolution(_)
                | Self::TokenIssuance(_)
                | Self::Widget(_)
                | Self::Exchange(_)
                | Self::ItemFetch(_)
                | Self::TransactionFetch(_)
        )
    }
}
