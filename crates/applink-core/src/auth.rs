//! Sign-in / sign-up flow: validate, call the service, persist the credential.

use std::sync::Arc;

use applink_types::{SignInForm, SignUpForm, UserSession};
use tracing::info;

use crate::client::{ClientError, CodeService};
use crate::credentials::{CredentialStore, StorageError};

pub struct AuthFlow<S> {
    service: Arc<S>,
    credentials: CredentialStore,
}

impl<S: CodeService> AuthFlow<S> {
    pub fn new(service: Arc<S>, credentials: CredentialStore) -> Self {
        Self {
            service,
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Validation failures are returned before any request is sent.
    pub async fn sign_in(&self, form: &SignInForm) -> Result<UserSession, ClientError> {
        form.check()?;
        let auth = self.service.sign_in(form).await?;
        self.credentials.store(&auth.token, &auth.user)?;
        info!(user = %auth.user.id, "signed in");
        Ok(auth.user)
    }

    pub async fn sign_up(&self, form: &SignUpForm) -> Result<UserSession, ClientError> {
        form.check()?;
        let auth = self.service.sign_up(form).await?;
        self.credentials.store(&auth.token, &auth.user)?;
        info!(user = %auth.user.id, "signed up");
        Ok(auth.user)
    }

    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.credentials.sign_out()?;
        info!("signed out");
        Ok(())
    }

    /// The stored user when both token and user entry are present.
    pub fn current_user(&self) -> Result<Option<UserSession>, StorageError> {
        if self.credentials.token()?.is_none() {
            return Ok(None);
        }
        self.credentials.user()
    }

    pub fn is_authenticated(&self) -> Result<bool, StorageError> {
        self.credentials.is_authenticated()
    }
}
