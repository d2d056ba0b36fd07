use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

const MAX_USERNAME_LEN: usize = 150;

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub password_hash: Option<String>,
    /// Reject the account if another one already uses this email
    /// (case-insensitive). Self-service signups set it.
    pub unique_email: bool,
}

impl Engine {
    pub(super) fn apply_account_event(&self, event: &Event) {
        match event {
            Event::AccountCreated { user, identity } => {
                self.usernames.insert(user.username.clone(), user.id);
                self.users.insert(user.id, user.clone());
                if let Some(identity) = identity {
                    self.link_identity(identity.clone());
                }
            }
            Event::UserUpdated { user } => {
                if let Some(previous) = self.users.insert(user.id, user.clone())
                    && previous.username != user.username
                {
                    self.usernames.remove(&previous.username);
                    self.usernames.insert(user.username.clone(), user.id);
                }
            }
            Event::IdentitySynced { identity } => self.link_identity(identity.clone()),
            _ => {}
        }
    }

    fn link_identity(&self, identity: ExternalIdentity) {
        self.identity_by_user
            .insert(identity.user_id, identity.national_id.clone());
        self.identities.insert(identity.national_id.clone(), identity);
    }

    pub fn email_taken(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty()
            && self
                .users
                .iter()
                .any(|u| u.email.trim().eq_ignore_ascii_case(email))
    }

    /// Create an account, optionally linked to an external identity, as one
    /// record. Fails with `AlreadyExists` if the username or national id is
    /// taken by the time the account lock is held.
    pub async fn create_account(
        &self,
        new: NewAccount,
        identity: Option<ExternalIdentity>,
    ) -> Result<UserAccount, EngineError> {
        let username = new.username.trim().to_string();
        if username.is_empty() {
            return Err(EngineError::Invalid("username is required".into()));
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(EngineError::LimitExceeded("username too long"));
        }

        let _shared = self.snapshot_gate.read().await;
        let _accounts = self.account_lock.lock().await;
        if self.usernames.contains_key(&username) {
            return Err(EngineError::AlreadyExists(format!("username {username}")));
        }
        if new.unique_email && self.email_taken(&new.email) {
            return Err(EngineError::AlreadyExists(format!("email {}", new.email)));
        }
        if let Some(identity) = &identity
            && self.identities.contains_key(&identity.national_id)
        {
            return Err(EngineError::AlreadyExists(format!(
                "identity {}",
                identity.national_id
            )));
        }

        let user = UserAccount {
            id: Ulid::new(),
            username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            is_staff: new.is_staff,
            is_active: true,
            password_hash: new.password_hash,
            created_at: self.clock.now(),
        };
        let identity = identity.map(|i| ExternalIdentity {
            user_id: user.id,
            ..i
        });
        let event = Event::AccountCreated {
            user: user.clone(),
            identity,
        };
        self.wal_append(&event).await?;
        self.apply_account_event(&event);

        tracing::info!(user = %user.id, username = %user.username, "account created");
        Ok(user)
    }

    /// Replace an existing account's profile fields. The username is fixed.
    pub async fn update_user(&self, user: UserAccount) -> Result<(), EngineError> {
        let _shared = self.snapshot_gate.read().await;
        let _accounts = self.account_lock.lock().await;
        let current = self
            .users
            .get(&user.id)
            .map(|u| u.value().clone())
            .ok_or_else(|| EngineError::user_not_found(user.id))?;
        if current.username != user.username {
            return Err(EngineError::Invalid("username cannot be changed".into()));
        }
        if current == user {
            return Ok(());
        }
        let event = Event::UserUpdated { user };
        self.wal_append(&event).await?;
        self.apply_account_event(&event);
        Ok(())
    }

    /// Store the refreshed link for an existing account.
    pub async fn sync_identity(&self, identity: ExternalIdentity) -> Result<(), EngineError> {
        let _shared = self.snapshot_gate.read().await;
        let _accounts = self.account_lock.lock().await;
        if !self.users.contains_key(&identity.user_id) {
            return Err(EngineError::user_not_found(identity.user_id));
        }
        if let Some(existing) = self.identities.get(&identity.national_id)
            && existing.user_id != identity.user_id
        {
            return Err(EngineError::AlreadyExists(format!(
                "identity {}",
                identity.national_id
            )));
        }
        let event = Event::IdentitySynced { identity };
        self.wal_append(&event).await?;
        self.apply_account_event(&event);
        Ok(())
    }

    pub fn user(&self, id: &Ulid) -> Option<UserAccount> {
        self.users.get(id).map(|u| u.value().clone())
    }

    pub fn user_by_username(&self, username: &str) -> Option<UserAccount> {
        let id = *self.usernames.get(username)?.value();
        self.user(&id)
    }

    pub fn username_taken(&self, username: &str) -> bool {
        self.usernames.contains_key(username)
    }

    pub fn identity(&self, national_id: &str) -> Option<ExternalIdentity> {
        self.identities.get(national_id).map(|i| i.value().clone())
    }

    pub fn identity_for_user(&self, user_id: &Ulid) -> Option<ExternalIdentity> {
        let national_id = self.identity_by_user.get(user_id)?.value().clone();
        self.identity(&national_id)
    }
}
