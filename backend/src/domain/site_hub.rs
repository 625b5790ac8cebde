//! Hub use-cases behind the realtime channel.
//!
//! Each method answers with a localised envelope. Methods that sign the
//! connection in also mint a bearer credential whose claims the adapter
//! keeps for later calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::ports::{
    CredentialError, CredentialService, HubReply, HubService, TokenClaims,
};
use crate::domain::{
    ActionProcessor, ActionRequest, ApiResponse, AuthenticationMode, Authenticator, Credentials,
    Error, Language, RequestIdentity, ResponseType, SignupRequest, UserAccount, account_response,
};

/// Production [`HubService`].
pub struct SiteHub {
    processor: Arc<ActionProcessor>,
    authenticator: Authenticator,
    credentials: Arc<dyn CredentialService>,
}

impl SiteHub {
    pub fn new(
        processor: Arc<ActionProcessor>,
        authenticator: Authenticator,
        credentials: Arc<dyn CredentialService>,
    ) -> Self {
        Self {
            processor,
            authenticator,
            credentials,
        }
    }

    fn issue(&self, claims: TokenClaims) -> Result<String, Error> {
        self.credentials
            .issue(&claims)
            .map_err(|err| Error::internal(format!("failed to issue credential: {err}")))
    }

    fn validate(&self, token: &str) -> Result<TokenClaims, Error> {
        self.credentials.validate(token).map_err(|err| match err {
            CredentialError::Invalid { .. } => Error::invalid_credentials(),
            CredentialError::Signing { .. } => Error::internal(err.to_string()),
        })
    }

    /// Envelope for `account` plus a credential bound to `claims`.
    fn signed_in(&self, account: &UserAccount, claims: TokenClaims) -> Result<HubReply, Error> {
        Ok(HubReply {
            response: account_response(account),
            token: Some(self.issue(claims)?),
            claims: Some(claims),
        })
    }

    async fn identify(&self, claims: Option<TokenClaims>) -> Result<RequestIdentity, Error> {
        let claims = claims.ok_or_else(Error::invalid_credentials)?;
        self.processor
            .identify(AuthenticationMode::UserCookie, &claims)
            .await
    }

    fn reply(
        &self,
        operation: &'static str,
        language: Language,
        result: Result<HubReply, Error>,
    ) -> HubReply {
        match result {
            Ok(reply) => reply,
            Err(err) => HubReply::response(self.processor.respond(operation, language, None, Err(err))),
        }
    }

    async fn try_check(&self, claims: Option<TokenClaims>) -> Result<HubReply, Error> {
        self.processor.system().require_loaded()?;
        let identity = self.identify(claims).await?;
        Ok(HubReply {
            response: account_response(identity.effective()),
            token: None,
            claims,
        })
    }

    async fn try_on_behalf_of(
        &self,
        claims: Option<TokenClaims>,
        email: &str,
    ) -> Result<HubReply, Error> {
        self.processor.system().require_loaded()?;
        let identity = self.identify(claims).await?;
        let identity = self.processor.impersonate(identity, email).await?;
        let claims = TokenClaims {
            user_id: identity.site_user.id,
            acting_as: Some(identity.effective_id()),
        };
        self.signed_in(identity.effective(), claims)
    }

    async fn try_revert(&self, claims: Option<TokenClaims>) -> Result<HubReply, Error> {
        self.processor.system().require_loaded()?;
        let identity = self.identify(claims).await?;
        info!(user_id = %identity.site_user.id, "stopped acting on behalf of another account");
        self.signed_in(
            &identity.site_user,
            TokenClaims::for_user(identity.site_user.id),
        )
    }
}

#[async_trait]
impl HubService for SiteHub {
    async fn config(&self) -> ApiResponse {
        let result = self.processor.system().require_loaded().map(|snapshot| {
            ApiResponse::success().with(ResponseType::Metadata, &snapshot.metadata.view())
        });
        self.processor
            .respond("config", Language::default(), None, result)
    }

    async fn signup(&self, request: SignupRequest) -> HubReply {
        let language = request.language.unwrap_or_default();
        let result = async {
            self.processor.system().require_loaded()?;
            let account = self.processor.signup(request).await?;
            self.signed_in(&account, TokenClaims::for_user(account.id))
        }
        .await;
        self.reply("signup", language, result)
    }

    async fn signin(&self, credentials: Credentials, user_agent: String) -> HubReply {
        let language = credentials.language.unwrap_or_default();
        let result = async {
            self.processor.system().require_loaded()?;
            let account = self
                .authenticator
                .authenticate(&credentials.username, &credentials.password, &user_agent)
                .await?;
            self.signed_in(&account, TokenClaims::for_user(account.id))
        }
        .await;
        self.reply("signin", language, result)
    }

    async fn verify_email(&self, code: String) -> ApiResponse {
        let result = async {
            let ticket = self.credentials.parse_verification(&code).map_err(|err| {
                debug!(error = %err, "unreadable verification link");
                Error::verification_expired()
            })?;
            let account = self
                .processor
                .verify_email(ticket.user_id, &ticket.code)
                .await?;
            Ok(account_response(&account))
        }
        .await;
        self.processor
            .respond("verify-email", Language::default(), None, result)
    }

    async fn authenticate(&self, token: String) -> HubReply {
        let result = async {
            let claims = self.validate(&token)?;
            let identity = self.identify(Some(claims)).await?;
            Ok(HubReply {
                response: account_response(identity.effective()),
                token: None,
                claims: Some(claims),
            })
        }
        .await;
        self.reply("authenticate", Language::default(), result)
    }

    async fn check(&self, claims: Option<TokenClaims>) -> HubReply {
        let result = self.try_check(claims).await;
        self.reply("check", Language::default(), result)
    }

    async fn on_behalf_of(&self, claims: Option<TokenClaims>, email: String) -> HubReply {
        let result = self.try_on_behalf_of(claims, &email).await;
        self.reply("obo", Language::default(), result)
    }

    async fn revert_on_behalf_of(&self, claims: Option<TokenClaims>) -> HubReply {
        let result = self.try_revert(claims).await;
        self.reply("revert-obo", Language::default(), result)
    }

    async fn request(&self, claims: Option<TokenClaims>, request: ActionRequest) -> ApiResponse {
        let identity = async {
            self.processor.system().require_loaded()?;
            self.identify(claims).await
        }
        .await;
        match identity {
            Ok(identity) => self.processor.process(&identity, request).await,
            Err(err) => {
                self.processor
                    .respond("request", Language::default(), None, Err(err))
            }
        }
    }

    async fn api_request(&self, token: String, request: ActionRequest) -> ApiResponse {
        let identity = async {
            self.processor.system().require_loaded()?;
            let claims = self.validate(&token)?;
            self.processor
                .identify(AuthenticationMode::Api, &claims)
                .await
        }
        .await;
        match identity {
            Ok(identity) => self.processor.process(&identity, request).await,
            Err(err) => {
                self.processor
                    .respond("api-request", Language::default(), None, Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account_directory::AccountDirectoryPorts;
    use crate::domain::notifications::NotificationDispatch;
    use crate::domain::password::HashCost;
    use crate::domain::ports::{MockBlobStore, MockCredentialService, VerificationTicket};
    use crate::domain::{
        AccountDirectory, AccountType, ActionType, ActivityLog, Identifier, PasswordHasher,
        Registration, ResponseCode, SystemSnapshot, SystemState,
    };
    use crate::outbound::persistence::MemoryTableStore;
    use crate::outbound::queue::MemoryNotificationQueue;
    use crate::test_support::{DeferredSideEffects, MutableClock};
    use chrono::Utc;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use zeroize::Zeroizing;

    const PASSWORD: &str = "Abcdefg1!";

    struct Harness {
        hub: SiteHub,
        directory: Arc<AccountDirectory>,
        system: SystemState,
    }

    impl Harness {
        async fn register(&self, email: &str, account_type: AccountType) -> UserAccount {
            self.directory
                .create_account(Registration {
                    email: email.to_owned(),
                    password: Zeroizing::new(PASSWORD.to_owned()),
                    display_name: "Someone".to_owned(),
                    language: Language::En,
                    account_type,
                })
                .await
                .expect("registered")
        }
    }

    /// Credentials encode claims as `user[:acting]` so tests can read them.
    fn credentials() -> MockCredentialService {
        let mut credentials = MockCredentialService::new();
        credentials.expect_issue().returning(|claims| {
            Ok(match claims.acting_as {
                Some(acting) => format!("{}:{acting}", claims.user_id),
                None => claims.user_id.encode(),
            })
        });
        credentials.expect_validate().returning(|token| {
            Identifier::parse(token)
                .map(TokenClaims::for_user)
                .ok_or_else(|| CredentialError::invalid("unreadable"))
        });
        credentials
            .expect_issue_verification()
            .returning(|ticket| Ok(format!("{}.{}", ticket.user_id, ticket.code)));
        credentials.expect_parse_verification().returning(|token| {
            let (user, code) = token
                .split_once('.')
                .ok_or_else(|| CredentialError::invalid("unreadable"))?;
            Ok(VerificationTicket {
                user_id: Identifier::decode(user),
                code: code.to_owned(),
            })
        });
        credentials
    }

    fn build(system: SystemState) -> Harness {
        let now = Utc::now();
        let clock = Arc::new(MutableClock::new(now));
        let effects = Arc::new(DeferredSideEffects::new());
        let credentials: Arc<dyn CredentialService> = Arc::new(credentials());
        let notifications = Arc::new(NotificationDispatch::new(
            Arc::new(MemoryNotificationQueue::new()),
            Arc::clone(&credentials),
            SystemState::loaded(SystemSnapshot::builtin(now)),
            clock.clone(),
            "https://site.test/",
        ));
        let directory = Arc::new(AccountDirectory::new(
            AccountDirectoryPorts {
                store: Arc::new(MemoryTableStore::new()),
                clock: clock.clone(),
                notifications,
                side_effects: effects.clone(),
            },
            PasswordHasher::new(HashCost::fast()),
        ));
        let mut blobs = MockBlobStore::new();
        blobs.expect_append().returning(|_, _| Ok(()));
        let activity = ActivityLog::new(Arc::new(blobs), clock);
        let processor = Arc::new(ActionProcessor::new(
            Arc::clone(&directory),
            system.clone(),
            activity.clone(),
            effects.clone(),
        ));
        let authenticator = Authenticator::new(Arc::clone(&directory), activity, effects);
        Harness {
            hub: SiteHub::new(processor, authenticator, credentials),
            directory,
            system,
        }
    }

    #[fixture]
    fn harness() -> Harness {
        build(SystemState::loaded(SystemSnapshot::builtin(Utc::now())))
    }

    #[tokio::test]
    async fn entry_points_answer_loading_until_the_system_loads() {
        let harness = build(SystemState::new());
        assert_eq!(harness.hub.config().await.code(), ResponseCode::Loading);
        let reply = harness
            .hub
            .signin(
                Credentials {
                    username: "jane@example.com".to_owned(),
                    password: Zeroizing::new(PASSWORD.to_owned()),
                    language: None,
                },
                "agent".to_owned(),
            )
            .await;
        assert_eq!(reply.response.code(), ResponseCode::Loading);
        assert!(reply.token.is_none());

        harness.system.install(SystemSnapshot::builtin(Utc::now()));
        let config = harness.hub.config().await;
        assert_eq!(config.code(), ResponseCode::Ok);
        assert!(config.data(ResponseType::Metadata).is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn signup_signs_the_connection_in(harness: Harness) {
        let reply = harness
            .hub
            .signup(SignupRequest {
                email: "Jane@Example.com".to_owned(),
                password: Zeroizing::new(PASSWORD.to_owned()),
                display_name: "Jane".to_owned(),
                ..SignupRequest::default()
            })
            .await;

        assert_eq!(reply.response.code(), ResponseCode::Ok);
        let user = reply.response.data(ResponseType::User).expect("user view");
        assert_eq!(user["email"], json!("jane@example.com"));
        let claims = reply.claims.expect("claims");
        assert_eq!(reply.token, Some(claims.user_id.encode()));
    }

    #[rstest]
    #[tokio::test]
    async fn failed_signin_carries_no_credential(harness: Harness) {
        harness
            .register("jane@example.com", AccountType::Standard)
            .await;
        let reply = harness
            .hub
            .signin(
                Credentials {
                    username: "jane@example.com".to_owned(),
                    password: Zeroizing::new("Wrongpass1".to_owned()),
                    language: Some(Language::Es),
                },
                "agent".to_owned(),
            )
            .await;
        assert_eq!(reply.response.code(), ResponseCode::InvalidCredentials);
        assert_eq!(
            reply.response.message(),
            harness
                .system
                .text_for(ResponseCode::InvalidCredentials, Language::Es)
        );
        assert!(reply.token.is_none());
        assert!(reply.claims.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn unreadable_verification_links_read_as_expired(harness: Harness) {
        let response = harness.hub.verify_email("garbage".to_owned()).await;
        assert_eq!(response.code(), ResponseCode::EmailVerificationCodeExpired);
    }

    #[rstest]
    #[tokio::test]
    async fn verification_links_verify_the_account(harness: Harness) {
        let account = harness
            .register("jane@example.com", AccountType::Standard)
            .await;
        let code = account
            .email_verification
            .as_ref()
            .map(|pending| pending.code.clone())
            .expect("pending verification");

        let response = harness
            .hub
            .verify_email(format!("{}.{code}", account.id))
            .await;

        assert_eq!(response.code(), ResponseCode::Ok);
        let user = response.data(ResponseType::User).expect("user view");
        assert_eq!(user["emailVerified"], json!(true));
    }

    #[rstest]
    #[tokio::test]
    async fn admins_switch_identity_and_back(harness: Harness) {
        let admin = harness.register("root@example.com", AccountType::Admin).await;
        let jane = harness
            .register("jane@example.com", AccountType::Standard)
            .await;

        let obo = harness
            .hub
            .on_behalf_of(
                Some(TokenClaims::for_user(admin.id)),
                "jane@example.com".to_owned(),
            )
            .await;
        assert_eq!(obo.response.code(), ResponseCode::Ok);
        let claims = obo.claims.expect("impersonating claims");
        assert_eq!(claims.acting_as, Some(jane.id));

        let response = harness
            .hub
            .request(
                Some(claims),
                ActionRequest {
                    action: ActionType::UserUpdateDisplayName,
                    request: Some(json!({"displayName": "Janet"})),
                    obo: None,
                },
            )
            .await;
        assert_eq!(response.code(), ResponseCode::Ok);
        let stored = harness
            .directory
            .require_account(jane.id)
            .await
            .expect("jane");
        assert_eq!(stored.display_name, "Janet");

        let reverted = harness.hub.revert_on_behalf_of(Some(claims)).await;
        assert_eq!(reverted.claims, Some(TokenClaims::for_user(admin.id)));
        assert_eq!(reverted.token, Some(admin.id.encode()));
    }

    #[rstest]
    #[tokio::test]
    async fn members_cannot_switch_identity(harness: Harness) {
        let jane = harness
            .register("jane@example.com", AccountType::Standard)
            .await;
        harness
            .register("other@example.com", AccountType::Standard)
            .await;
        let reply = harness
            .hub
            .on_behalf_of(
                Some(TokenClaims::for_user(jane.id)),
                "other@example.com".to_owned(),
            )
            .await;
        assert_eq!(
            reply.response.code(),
            ResponseCode::InsufficientPermissionMember
        );
        assert!(reply.claims.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn anonymous_connections_must_sign_in(harness: Harness) {
        let check = harness.hub.check(None).await;
        assert_eq!(check.response.code(), ResponseCode::InvalidCredentials);
        let response = harness
            .hub
            .request(
                None,
                ActionRequest {
                    action: ActionType::UserCancel,
                    request: None,
                    obo: None,
                },
            )
            .await;
        assert_eq!(response.code(), ResponseCode::InvalidCredentials);
    }

    #[rstest]
    #[tokio::test]
    async fn authenticate_binds_a_valid_token(harness: Harness) {
        let jane = harness
            .register("jane@example.com", AccountType::Standard)
            .await;
        let reply = harness.hub.authenticate(jane.id.encode()).await;
        assert_eq!(reply.response.code(), ResponseCode::Ok);
        assert_eq!(reply.claims, Some(TokenClaims::for_user(jane.id)));

        let refused = harness.hub.authenticate("forged".to_owned()).await;
        assert_eq!(refused.response.code(), ResponseCode::InvalidCredentials);
    }

    #[rstest]
    #[tokio::test]
    async fn api_credentials_reach_internal_actions_only_for_admins(harness: Harness) {
        let admin = harness.register("root@example.com", AccountType::Admin).await;
        let jane = harness
            .register("jane@example.com", AccountType::Standard)
            .await;
        let mark = |user_id: Identifier| ActionRequest {
            action: ActionType::InternalMarkContactMethodInvalid,
            request: Some(json!({"userId": user_id.encode()})),
            obo: None,
        };

        let refused = harness.hub.api_request(jane.id.encode(), mark(jane.id)).await;
        assert_eq!(refused.code(), ResponseCode::NotFound);

        let accepted = harness.hub.api_request(admin.id.encode(), mark(jane.id)).await;
        assert_eq!(accepted.code(), ResponseCode::Ok);
        let stored = harness
            .directory
            .require_account(jane.id)
            .await
            .expect("jane");
        assert!(stored.email_invalid);

        let forged = harness.hub.api_request("forged".to_owned(), mark(jane.id)).await;
        assert_eq!(forged.code(), ResponseCode::InvalidCredentials);
    }
}
