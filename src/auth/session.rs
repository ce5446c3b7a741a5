use std::collections::HashMap;
use std::sync::Arc;

use argon2::Config as ArgonConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{AuthEvent, AuthEvents, AuthSubscription, IdentityProvider, Session, SignIn, SignUp};
use crate::db::{Store, StoreError};
use crate::models::{Credential, Profile, ProfilePatch};
use crate::utils::error::AppError;

const MIN_PASSWORD_LEN: usize = 8;
const AUTH_EVENT_BUFFER: usize = 64;

struct SessionEntry {
    profile_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// Identity provider backed by argon2 credentials in the store and opaque
/// session tokens held in memory.
pub struct SessionAuth {
    store: Arc<dyn Store>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    session_ttl: Duration,
    events: AuthEvents,
}

impl SessionAuth {
    pub fn new(store: Arc<dyn Store>, session_ttl: Duration) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
            events: AuthEvents::new(AUTH_EVENT_BUFFER),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every expired session and return how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let now = Utc::now();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }

    async fn open_session(&self, profile: Profile) -> Session {
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let entry = SessionEntry {
            profile_id: profile.id,
            expires_at: now + self.session_ttl,
        };
        {
            let mut sessions = self.sessions.write().await;
            sessions.retain(|_, existing| existing.expires_at > now);
            sessions.insert(token.clone(), entry);
        }
        self.events.publish(AuthEvent::SignedIn {
            profile_id: profile.id,
        });
        Session { token, profile }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_sign_up(input: &SignUp) -> Result<(), AppError> {
    let email = input.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(AppError::ValidationError("A valid email is required".into()));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt: [u8; 16] = rand::thread_rng().gen();
        argon2::hash_encoded(password.as_bytes(), &salt, &ArgonConfig::default())
            .map_err(|e| AppError::InternalServerError(format!("Password hashing failed: {e}")))
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Hashing task failed: {e}")))?
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        argon2::verify_encoded(&hash, password.as_bytes())
            .map_err(|e| AppError::InternalServerError(format!("Stored hash unreadable: {e}")))
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Hashing task failed: {e}")))?
}

#[async_trait]
impl IdentityProvider for SessionAuth {
    #[instrument(name = "auth.sign_up", skip(self, input), fields(email = %input.email))]
    async fn sign_up(&self, input: SignUp) -> Result<Session, AppError> {
        validate_sign_up(&input)?;

        let email = normalize_email(&input.email);
        let password_hash = hash_password(input.password).await?;
        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            email: email.clone(),
            full_name: input.full_name.filter(|name| !name.trim().is_empty()),
            role: input.role,
            avatar_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        };
        let credential = Credential {
            profile_id: profile.id,
            email,
            password_hash,
        };

        let profile = self
            .store
            .create_account(profile, credential)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation { .. } => {
                    AppError::Conflict("An account with this email already exists".into())
                }
                other => other.into(),
            })?;

        info!(profile_id = %profile.id, role = ?profile.role, "Account created");
        Ok(self.open_session(profile).await)
    }

    #[instrument(name = "auth.sign_in", skip(self, input), fields(email = %input.email))]
    async fn sign_in(&self, input: SignIn) -> Result<Session, AppError> {
        let rejected = || AppError::AuthError("Invalid email or password".into());

        let credential = self
            .store
            .find_credential(&normalize_email(&input.email))
            .await?
            .ok_or_else(rejected)?;
        if !verify_password(input.password, credential.password_hash).await? {
            return Err(rejected());
        }

        let profile = self
            .store
            .find_profile(credential.profile_id)
            .await?
            .ok_or_else(rejected)?;

        info!(profile_id = %profile.id, "Signed in");
        Ok(self.open_session(profile).await)
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        let removed = self.sessions.write().await.remove(token);
        if let Some(entry) = removed {
            info!(profile_id = %entry.profile_id, "Signed out");
            self.events.publish(AuthEvent::SignedOut {
                profile_id: entry.profile_id,
            });
        }
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<Option<Profile>, AppError> {
        let profile_id = {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(entry) if entry.expires_at > Utc::now() => Some(entry.profile_id),
                Some(_) => None,
                None => return Ok(None),
            }
        };

        match profile_id {
            Some(id) => Ok(self.store.find_profile(id).await?),
            None => {
                self.sessions.write().await.remove(token);
                Ok(None)
            }
        }
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, AppError> {
        self.store
            .find_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile '{id}' was not found")))
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, AppError> {
        let mut profile = self.get_profile(id).await?;
        patch.apply_to(&mut profile);
        profile.updated_at = Utc::now();
        Ok(self.store.update_profile(profile).await?)
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }
}
