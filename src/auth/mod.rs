//! Identity provider port: accounts, sessions and auth-state notifications.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Profile, ProfilePatch, Role};
use crate::utils::error::AppError;

pub mod extract;
pub mod session;

pub use extract::{BearerToken, CurrentUser, MaybeUser};
pub use session::SessionAuth;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn { profile_id: Uuid },
    SignedOut { profile_id: Uuid },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Attendee
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub profile: Profile,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, input: SignUp) -> Result<Session, AppError>;
    async fn sign_in(&self, input: SignIn) -> Result<Session, AppError>;
    async fn sign_out(&self, token: &str) -> Result<(), AppError>;
    /// Profile behind a live session token, if any.
    async fn current_user(&self, token: &str) -> Result<Option<Profile>, AppError>;
    async fn get_profile(&self, id: Uuid) -> Result<Profile, AppError>;
    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, AppError>;
    /// Listen for sign-in and sign-out. The listener is released when the
    /// returned handle is dropped.
    fn subscribe(&self) -> AuthSubscription;
}

/// Fan-out of auth events with a live listener count.
#[derive(Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
    listeners: Arc<AtomicUsize>,
}

impl AuthEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            listeners: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn publish(&self, event: AuthEvent) {
        // No listeners is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> AuthSubscription {
        self.listeners.fetch_add(1, Ordering::SeqCst);
        AuthSubscription {
            receiver: self.sender.subscribe(),
            listeners: self.listeners.clone(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }
}

/// Scoped auth-change listener.
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthEvent>,
    listeners: Arc<AtomicUsize>,
}

impl AuthSubscription {
    /// Next event, or `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth listener lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        let remaining = self.listeners.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::debug!(remaining, "Auth listener released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_receives_and_releases() {
        let events = AuthEvents::new(8);
        let profile_id = Uuid::new_v4();

        {
            let mut sub = events.subscribe();
            assert_eq!(events.listener_count(), 1);
            events.publish(AuthEvent::SignedIn { profile_id });
            assert_eq!(sub.recv().await, Some(AuthEvent::SignedIn { profile_id }));
        }
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_listener_released_on_error_path() {
        let events = AuthEvents::new(8);

        let result: Result<(), &str> = (|| {
            let _sub = events.subscribe();
            Err::<(), &str>("view failed to load")?;
            Ok(())
        })();

        assert!(result.is_err());
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_auth_event_json_shape() {
        let id = Uuid::nil();
        let json = serde_json::to_value(AuthEvent::SignedOut { profile_id: id }).unwrap();
        assert_eq!(json["type"], "signed_out");
        assert_eq!(json["profile_id"], id.to_string());
    }
}
