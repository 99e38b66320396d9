use serde::{Deserialize, Serialize};
use shared::domain::{User, UserId};
use tracing::{debug, info, warn};

use crate::{backend::LinkBackend, error::LinkError};

/// Known users of this session and the one currently acting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStore {
    users: Vec<User>,
    active: Option<UserId>,
}

impl SessionStore {
    pub fn known_users(&self) -> &[User] {
        &self.users
    }

    pub fn active_user(&self) -> Option<&User> {
        let active = self.active?;
        self.users.iter().find(|user| user.id == active)
    }

    pub fn is_known(&self, user_id: UserId) -> bool {
        self.users.iter().any(|user| user.id == user_id)
    }

    /// Adds `user` unless its id is already known, and makes it active.
    pub fn with_active(&self, user: User) -> Self {
        let mut next = self.clone();
        next.active = Some(user.id);
        if !next.is_known(user.id) {
            next.users.push(user);
        }
        next
    }

    pub fn select(&self, user_id: UserId) -> Result<Self, LinkError> {
        if !self.is_known(user_id) {
            return Err(LinkError::UnknownUser(user_id));
        }
        let mut next = self.clone();
        next.active = Some(user_id);
        Ok(next)
    }
}

/// How a submitted user string is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// All digits: looked up as an id first, created under the literal name otherwise.
    Id { id: UserId, literal: String },
    Name(String),
}

impl UserInput {
    pub fn parse(input: &str) -> Result<Self, LinkError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(LinkError::EmptyUsername);
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = trimmed.parse::<i64>() {
                return Ok(Self::Id {
                    id: UserId(id),
                    literal: trimmed.to_string(),
                });
            }
        }
        Ok(Self::Name(trimmed.to_string()))
    }
}

/// Looks up or creates the user named by `input`.
pub async fn resolve_user(backend: &dyn LinkBackend, input: &str) -> Result<User, LinkError> {
    let username = match UserInput::parse(input)? {
        UserInput::Id { id, literal } => match backend.get_user(id).await {
            Ok(user) => {
                debug!("session: resolved existing user id={}", user.id);
                return Ok(user);
            }
            Err(err) if err.is_not_found() => {
                debug!("session: no user id={id}, creating user named '{literal}'");
                literal
            }
            Err(err) => {
                warn!("session: lookup of user id={id} failed ({err}); creating user named '{literal}'");
                literal
            }
        },
        UserInput::Name(name) => name,
    };

    let user = backend
        .create_user(&username)
        .await
        .map_err(LinkError::UserResolution)?;
    info!("session: created user id={} username={}", user.id, user.username);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: &str) -> User {
        User {
            id: UserId(id),
            username: name.to_string(),
        }
    }

    #[test]
    fn parse_classifies_digits_as_ids() {
        assert_eq!(
            UserInput::parse(" 42 ").expect("parse"),
            UserInput::Id {
                id: UserId(42),
                literal: "42".into()
            }
        );
        assert_eq!(
            UserInput::parse("alice7").expect("parse"),
            UserInput::Name("alice7".into())
        );
        assert_eq!(
            UserInput::parse("-3").expect("parse"),
            UserInput::Name("-3".into())
        );
    }

    #[test]
    fn parse_treats_overflowing_digits_as_a_name() {
        let huge = "99999999999999999999999";
        assert_eq!(
            UserInput::parse(huge).expect("parse"),
            UserInput::Name(huge.into())
        );
    }

    #[test]
    fn parse_rejects_blank_input() {
        assert!(matches!(
            UserInput::parse("   "),
            Err(LinkError::EmptyUsername)
        ));
    }

    #[test]
    fn with_active_dedups_by_id_and_switches_active() {
        let store = SessionStore::default()
            .with_active(user(1, "alice"))
            .with_active(user(2, "bob"))
            .with_active(user(1, "alice"));

        assert_eq!(store.known_users().len(), 2);
        assert_eq!(store.active_user().map(|u| u.id), Some(UserId(1)));
    }

    #[test]
    fn same_username_under_new_id_is_kept() {
        let store = SessionStore::default()
            .with_active(user(1, "alice"))
            .with_active(user(2, "alice"));
        assert_eq!(store.known_users().len(), 2);
    }

    #[test]
    fn select_requires_known_user() {
        let store = SessionStore::default()
            .with_active(user(1, "alice"))
            .with_active(user(2, "bob"));

        let selected = store.select(UserId(1)).expect("select");
        assert_eq!(selected.active_user().map(|u| u.id), Some(UserId(1)));
        assert!(matches!(
            store.select(UserId(9)),
            Err(LinkError::UnknownUser(UserId(9)))
        ));
    }
}
