//! ACME account sessions
//!
//! An [`AcmeSession`] binds a client to one account for the length of an
//! issuance. Stored account material (from the authority's options, falling
//! back to process defaults) is reused when complete; otherwise a fresh key
//! is generated and a new account registered.

use std::sync::Arc;

use tracing::{debug, info};

use zonecert_common::{count_event, RetryPolicy};
use zonecert_config::{
    AcmeDefaults, Authority, AuthorityOptions, ACME_PRIVATE_KEY_OPTION, ACME_REGR_OPTION,
    ACME_URL_OPTION, EMAIL_OPTION, TELEPHONE_OPTION,
};

use super::account_key::AccountKey;
use super::client::{AcmeClient, AcmeConnector, NewRegistration, Registration};
use super::error::IssuanceError;
use super::store::AuthorityStore;

/// Client handle bound to one account
#[derive(Clone)]
pub struct AcmeSession {
    client: Arc<dyn AcmeClient>,
    key: Arc<AccountKey>,
    directory_url: String,
}

impl AcmeSession {
    pub fn new(client: Arc<dyn AcmeClient>, key: Arc<AccountKey>, directory_url: String) -> Self {
        Self {
            client,
            key,
            directory_url,
        }
    }

    pub fn client(&self) -> &dyn AcmeClient {
        self.client.as_ref()
    }

    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }
}

impl std::fmt::Debug for AcmeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeSession")
            .field("directory_url", &self.directory_url)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Resolved account settings for one authority
struct AccountSettings<'a> {
    email: Option<&'a str>,
    telephone: Option<&'a str>,
    directory_url: &'a str,
    private_key: Option<&'a str>,
    registration: Option<&'a str>,
}

impl<'a> AccountSettings<'a> {
    fn resolve(options: &'a AuthorityOptions, defaults: &'a AcmeDefaults) -> Self {
        Self {
            email: options.get_str(EMAIL_OPTION).or(defaults.email.as_deref()),
            telephone: options
                .get_str(TELEPHONE_OPTION)
                .or(defaults.telephone.as_deref()),
            directory_url: options
                .get_str(ACME_URL_OPTION)
                .unwrap_or(&defaults.directory_url),
            private_key: options
                .get_str(ACME_PRIVATE_KEY_OPTION)
                .or(defaults.private_key.as_deref()),
            registration: options
                .get_str(ACME_REGR_OPTION)
                .or(defaults.registration.as_deref()),
        }
    }
}

/// Obtains account sessions, reusing stored accounts when possible
pub struct AccountSessionManager {
    connector: Arc<dyn AcmeConnector>,
    defaults: Arc<AcmeDefaults>,
    store: Arc<dyn AuthorityStore>,
    retry: RetryPolicy,
}

impl AccountSessionManager {
    pub fn new(
        connector: Arc<dyn AcmeConnector>,
        defaults: Arc<AcmeDefaults>,
        store: Arc<dyn AuthorityStore>,
    ) -> Self {
        let retry = defaults.retry;
        Self {
            connector,
            defaults,
            store,
            retry,
        }
    }

    /// Whether a stored key and registration are available for `authority`
    pub fn can_reuse_account(&self, authority: &Authority) -> Result<bool, IssuanceError> {
        let options = authority_options(authority)?;
        let settings = AccountSettings::resolve(options, &self.defaults);
        Ok(settings.private_key.is_some() && settings.registration.is_some())
    }

    /// Obtain a session for `authority`.
    ///
    /// Returns the new registration when an account was created, `None` when
    /// a stored account was reused. Transient failures are retried per the
    /// configured policy.
    pub async fn obtain_session(
        &self,
        authority: &Authority,
    ) -> Result<(AcmeSession, Option<Registration>), IssuanceError> {
        let options = authority_options(authority)?;

        self.retry
            .run(
                "acme_session_setup",
                || self.setup(authority, options),
                |e: &IssuanceError| {
                    let retry = e.is_retryable();
                    if retry {
                        count_event("acme_session_setup_retry");
                    }
                    retry
                },
            )
            .await
    }

    async fn setup(
        &self,
        authority: &Authority,
        options: &AuthorityOptions,
    ) -> Result<(AcmeSession, Option<Registration>), IssuanceError> {
        let settings = AccountSettings::resolve(options, &self.defaults);

        if let (Some(stored_key), Some(stored_regr)) = (settings.private_key, settings.registration)
        {
            debug!(authority = %authority.name, "Reusing existing ACME account");
            let key = Arc::new(AccountKey::from_json(stored_key)?);
            let registration =
                Registration::from_json(stored_regr).map_err(IssuanceError::Registration)?;

            debug!(directory_url = %settings.directory_url, "Connecting to ACME directory");
            let client = self
                .connector
                .connect(settings.directory_url, Arc::clone(&key), Some(registration))
                .await?;

            return Ok((
                AcmeSession::new(client, key, settings.directory_url.to_string()),
                None,
            ));
        }

        debug!(authority = %authority.name, "Creating a new ACME account");
        let key = Arc::new(AccountKey::generate()?);

        debug!(directory_url = %settings.directory_url, "Connecting to ACME directory");
        let client = self
            .connector
            .connect(settings.directory_url, Arc::clone(&key), None)
            .await?;

        let registration = client
            .new_account_and_tos(NewRegistration::from_email(settings.email))
            .await?;

        if options.store_account() {
            let mut updated = options.clone();
            updated.push(ACME_PRIVATE_KEY_OPTION, key.to_json()?);
            updated.push(
                ACME_REGR_OPTION,
                registration
                    .to_stored_json()
                    .map_err(IssuanceError::Registration)?,
            );

            self.store
                .update_options(&authority.id, &updated)
                .await
                .map_err(|source| IssuanceError::Persistence {
                    authority_id: authority.id.clone(),
                    source,
                })?;
            info!(authority = %authority.name, "Stored new ACME account in authority options");
        }

        info!(
            authority = %authority.name,
            account = %registration.uri,
            telephone = settings.telephone.is_some(),
            "Connected with new ACME account"
        );

        Ok((
            AcmeSession::new(client, key, settings.directory_url.to_string()),
            Some(registration),
        ))
    }
}

fn authority_options(authority: &Authority) -> Result<&AuthorityOptions, IssuanceError> {
    authority
        .options
        .as_ref()
        .filter(|options| !options.is_empty())
        .ok_or_else(|| IssuanceError::InvalidAuthority {
            authority_id: authority.id.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let defaults = AcmeDefaults {
            email: Some("default@example.com".to_string()),
            private_key: Some("{\"kty\":\"RSA\"}".to_string()),
            ..Default::default()
        };
        let options = AuthorityOptions::from_json(
            r#"[
                {"name": "email", "value": ""},
                {"name": "acme_url", "value": "https://acme.test/directory"},
                {"name": "acme_regr", "value": null}
            ]"#,
        )
        .unwrap();

        let settings = AccountSettings::resolve(&options, &defaults);
        assert_eq!(settings.email, Some("default@example.com"));
        assert_eq!(settings.directory_url, "https://acme.test/directory");
        assert!(settings.private_key.is_some());
        assert!(settings.registration.is_none());
        assert!(settings.telephone.is_none());
    }

    #[test]
    fn test_authority_without_options() {
        let authority = Authority::new("1", "empty");
        assert!(matches!(
            authority_options(&authority),
            Err(IssuanceError::InvalidAuthority { .. })
        ));

        let authority = Authority::new("1", "empty").with_options(AuthorityOptions::default());
        assert!(authority_options(&authority).is_err());
    }
}
