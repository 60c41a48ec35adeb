use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::accounts_repository::{AccountsRepository, AccountsRepositoryError};
use crate::api::{Profile, Role, SessionContext, SessionToken, SignInRequest, SignUpRequest, UserId};
use crate::profiles_repository::{ProfilesRepository, ProfilesRepositoryError};
use crate::validation::{normalize_email, validate_sign_up, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Account with e-mail {0} already exists")]
    EmailTaken(String),

    #[error("Invalid e-mail or password")]
    InvalidCredentials,

    #[error("Accounts failure {0}")]
    Accounts(AccountsRepositoryError),

    #[error("Profiles failure {0}")]
    Profiles(#[from] ProfilesRepositoryError),

    #[error("Password hashing failure {0}")]
    PasswordHashing(#[from] argon2::password_hash::Error),
}

impl From<AccountsRepositoryError> for AuthError {
    fn from(err: AccountsRepositoryError) -> Self {
        match err {
            AccountsRepositoryError::EmailTaken(email) => AuthError::EmailTaken(email),
            other => AuthError::Accounts(other),
        }
    }
}

/// Argon2id with a random salt, encoded as a PHC string
fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(stored_hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Credentials, profiles bootstrap and ephemeral bearer sessions
pub struct AuthService {
    accounts: Arc<dyn AccountsRepository>,
    profiles: Arc<dyn ProfilesRepository>,
    admin_emails: HashSet<String>,
    sessions: parking_lot::RwLock<HashMap<String, UserId>>,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountsRepository>,
        profiles: Arc<dyn ProfilesRepository>,
        admin_emails: &[String],
    ) -> Self {
        Self {
            accounts,
            profiles,
            admin_emails: admin_emails
                .iter()
                .map(|email| normalize_email(email))
                .collect(),
            sessions: Default::default(),
        }
    }

    /// Creates the account and its profile. New profiles get the user role
    /// unless the e-mail is configured as an admin one.
    /// The account is removed again if its profile cannot be stored.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<UserId, AuthError> {
        validate_sign_up(&request)?;
        let email = normalize_email(&request.email);
        let password_hash = hash_password(&request.password)?;

        let user_id = self.accounts.create_account(&email, &password_hash).await?;
        let role = if self.admin_emails.contains(&email) {
            Role::Admin
        } else {
            Role::User
        };
        let created = self
            .profiles
            .create_profile(Profile {
                user_id,
                display_name: request.display_name.trim().to_string(),
                bio: String::new(),
                role,
            })
            .await;
        if let Err(err) = created {
            match self.accounts.delete_account(user_id).await {
                Ok(_) => tracing::warn!("Profile of user {} not created, account removed", user_id),
                Err(rollback_err) => tracing::error!(
                    "Profile of user {} not created, removing account failed {}",
                    user_id,
                    rollback_err
                ),
            }
            return Err(err.into());
        }

        tracing::info!("Signed up user {} with role {}", user_id, role.as_str());
        Ok(user_id)
    }

    pub async fn sign_in(&self, request: SignInRequest) -> Result<SessionToken, AuthError> {
        let account = self
            .accounts
            .find_account(&normalize_email(&request.email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &account.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let token = uuid::Uuid::new_v4().to_string();
        self.sessions.write().insert(token.clone(), account.user_id);
        Ok(SessionToken {
            token,
            user_id: account.user_id,
        })
    }

    /// Returns false if there was no such session
    pub fn sign_out(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    /// Current identity behind the token, role always read from the stored profile
    pub async fn resolve(&self, token: &str) -> Result<Option<SessionContext>, AuthError> {
        let Some(user_id) = self.sessions.read().get(token).cloned() else {
            return Ok(None);
        };
        match self.profiles.get_profile(user_id).await {
            Ok(profile) => Ok(Some(SessionContext {
                user_id,
                display_name: profile.display_name,
                role: profile.role,
            })),
            Err(ProfilesRepositoryError::NotFound(_)) => {
                tracing::warn!("Session of user {} has no profile", user_id);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod auth_tests {
    use crate::accounts_repository::InMemoryAccountsRepository;
    use crate::profiles_repository::InMemoryProfilesRepository;

    use super::*;

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(InMemoryAccountsRepository::default()),
            Arc::new(InMemoryProfilesRepository::default()),
            &["Editor@Example.com".to_string()],
        )
    }

    fn sign_up_request(email: &str, display_name: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: "secret123".to_string(),
            display_name: display_name.to_string(),
        }
    }

    #[tokio::test]
    async fn sign_up_sign_in_resolve_and_sign_out() {
        let auth = service();
        let user_id = auth
            .sign_up(sign_up_request("reader@example.com", " reader "))
            .await
            .unwrap();

        let session = auth
            .sign_in(SignInRequest {
                email: "READER@example.com".to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.user_id, user_id);

        let context = auth.resolve(&session.token).await.unwrap().unwrap();
        assert_eq!(
            context,
            SessionContext {
                user_id,
                display_name: "reader".to_string(),
                role: Role::User,
            }
        );

        assert!(auth.sign_out(&session.token));
        assert!(!auth.sign_out(&session.token));
        assert_eq!(auth.resolve(&session.token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = service();
        auth.sign_up(sign_up_request("reader@example.com", "reader"))
            .await
            .unwrap();
        let result = auth
            .sign_in(SignInRequest {
                email: "reader@example.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        let unknown = auth
            .sign_in(SignInRequest {
                email: "nobody@example.com".to_string(),
                password: "secret123".to_string(),
            })
            .await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn empty_display_name_creates_nothing() {
        let auth = service();
        let result = auth
            .sign_up(sign_up_request("reader@example.com", ""))
            .await;
        assert!(matches!(
            result,
            Err(AuthError::Validation(ValidationError::EmptyDisplayName))
        ));
        // e-mail is still free
        assert!(auth
            .sign_up(sign_up_request("reader@example.com", "reader"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn duplicate_email_and_admin_bootstrap() {
        let auth = service();
        let admin_id = auth
            .sign_up(sign_up_request("editor@example.com", "editor"))
            .await
            .unwrap();
        assert!(matches!(
            auth.sign_up(sign_up_request("EDITOR@example.com", "copycat"))
                .await,
            Err(AuthError::EmailTaken(..))
        ));

        let token = auth
            .sign_in(SignInRequest {
                email: "editor@example.com".to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap()
            .token;
        let context = auth.resolve(&token).await.unwrap().unwrap();
        assert_eq!(context.user_id, admin_id);
        assert_eq!(context.role, Role::Admin);
    }

    #[test]
    fn password_hash_is_salted_phc_string() {
        let first = hash_password("secret123").unwrap();
        let second = hash_password("secret123").unwrap();
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);

        assert!(verify_password("secret123", &first).unwrap());
        assert!(verify_password("secret123", &second).unwrap());
        assert!(!verify_password("secret124", &first).unwrap());
        assert!(verify_password("secret123", "not a phc string").is_err());
    }

    /// Rejects every new profile
    struct UnavailableProfiles;

    #[async_trait::async_trait]
    impl ProfilesRepository for UnavailableProfiles {
        async fn create_profile(&self, profile: Profile) -> Result<(), ProfilesRepositoryError> {
            Err(ProfilesRepositoryError::AlreadyExists(profile.user_id))
        }

        async fn get_profile(&self, user_id: UserId) -> Result<Profile, ProfilesRepositoryError> {
            Err(ProfilesRepositoryError::NotFound(user_id))
        }

        async fn update_profile(
            &self,
            _user_id: UserId,
            _patch: crate::api::ProfilePatch,
        ) -> Result<bool, ProfilesRepositoryError> {
            Ok(false)
        }

        async fn display_names(
            &self,
            _user_ids: &[UserId],
        ) -> Result<HashMap<UserId, String>, ProfilesRepositoryError> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn failed_profile_creation_removes_account() {
        let accounts = Arc::new(InMemoryAccountsRepository::default());
        let auth = AuthService::new(accounts.clone(), Arc::new(UnavailableProfiles), &[]);

        let result = auth
            .sign_up(sign_up_request("reader@example.com", "reader"))
            .await;
        assert!(matches!(result, Err(AuthError::Profiles(..))));
        assert!(accounts
            .find_account("reader@example.com")
            .await
            .unwrap()
            .is_none());

        // nothing was left behind to sign in with
        let sign_in = auth
            .sign_in(SignInRequest {
                email: "reader@example.com".to_string(),
                password: "secret123".to_string(),
            })
            .await;
        assert!(matches!(sign_in, Err(AuthError::InvalidCredentials)));

        // and the e-mail can be used again
        assert!(matches!(
            auth.sign_up(sign_up_request("reader@example.com", "reader"))
                .await,
            Err(AuthError::Profiles(..))
        ));
    }
}
