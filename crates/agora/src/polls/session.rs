use serde::{Deserialize, Serialize};

use super::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// An authenticated caller as vouched for by the auth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
}

impl Session {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Caller identity handed to every use case explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(Session),
}

impl Identity {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(session) => Some(session),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.session().is_some_and(Session::is_admin)
    }
}

impl From<Session> for Identity {
    fn from(session: Session) -> Self {
        Identity::Authenticated(session)
    }
}
