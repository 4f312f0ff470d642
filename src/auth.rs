//! Login gate for note pages.
//!
//! When `[auth]` is configured, every `/books/<slug>/` page sits behind a
//! hosted login. The identity provider stays external: this module builds its
//! URLs, exchanges the login code for an ID token and reads the user's names
//! from it. What the reader sees is decided by [`AuthContext::check`]:
//!
//! | Session state                              | Outcome                          |
//! |--------------------------------------------|----------------------------------|
//! | loading                                    | placeholder page                 |
//! | not authenticated                          | redirect to the hosted login     |
//! | authenticated, family name not allowed     | logout once, redirect to logout  |
//! | authenticated and allowed                  | render the note                  |
//!
//! ## Hosted login round trip
//!
//! Authorization code flow with PKCE (S256):
//!
//! ```text
//! /login     → pending login stored under a random state
//!            → 302 https://<domain>/authorize?...&state=..&code_challenge=..
//! /callback  → state checked, code exchanged at https://<domain>/oauth/token
//!            → names read from the ID token, session cookie set, 302 back
//! /logout    → session dropped
//!            → 302 https://<domain>/v2/logout?client_id=..&returnTo=<origin>
//! ```
//!
//! The provider is built once at startup and passed to the server explicitly.

use crate::config::AuthConfig;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use maud::{Markup, html};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use ureq::Agent;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "stacks_session";

/// HTTP timeout for the token exchange.
const TOKEN_TIMEOUT_SECS: u64 = 30;

/// How long a started login waits for its callback.
pub const PENDING_LOGIN_TTL: Duration = Duration::from_secs(10 * 60);

/// Most logins kept waiting at once; the oldest is dropped past this.
pub const MAX_PENDING_LOGINS: usize = 256;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Login state does not match any pending login")]
    StateMismatch,
    #[error("Provider returned an error: {0}")]
    Provider(String),
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    #[error("Malformed ID token: {0}")]
    MalformedIdToken(String),
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
}

/// Names read from the ID token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

/// Read-only view of the provider session for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
}

impl SessionView {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: UserProfile) -> Self {
        Self {
            is_loading: false,
            is_authenticated: true,
            user: Some(user),
        }
    }
}

/// What the gate decided for a gated page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Session state not known yet.
    Placeholder,
    /// Send the browser to this login URL.
    RedirectToLogin(String),
    /// The user was logged out; send the browser to this URL.
    LoggedOut(String),
    Render,
}

/// The two provider operations the gate needs.
pub trait IdentityProvider {
    /// Start a hosted login that comes back to `return_path`. Returns the URL
    /// to send the browser to.
    fn login_with_redirect(&mut self, return_path: &str) -> String;

    /// End the provider session. Returns the URL to send the browser to,
    /// which lands on `return_to` afterwards.
    fn logout(&mut self, return_to: &str) -> String;
}

/// A provider that can also finish its own login round trip. This is what
/// the server holds.
pub trait HostedProvider: IdentityProvider {
    /// Finish the round trip started by
    /// [`login_with_redirect`](IdentityProvider::login_with_redirect).
    ///
    /// Returns the user and the path the login was started from.
    fn complete_login(
        &mut self,
        code: &str,
        state: &str,
    ) -> Result<(UserProfile, String), AuthError>;
}

/// Gate settings, built once from `[auth]` and the site origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub domain: String,
    pub client_id: String,
    /// Post-logout target and callback base.
    pub origin: String,
    pub allowed_family_name: String,
}

impl AuthContext {
    pub fn new(config: &AuthConfig, origin: &str) -> Self {
        Self {
            domain: config.domain.clone(),
            client_id: config.client_id.clone(),
            origin: origin.trim_end_matches('/').to_string(),
            allowed_family_name: config.allowed_family_name.clone(),
        }
    }

    /// Decide what a gated page shows.
    ///
    /// Logout is invoked at most once per call and only for a signed-in user
    /// outside the allow-list. A signed-in session without a user profile is
    /// treated the same way.
    pub fn check<P: IdentityProvider + ?Sized>(
        &self,
        session: &SessionView,
        provider: &mut P,
        return_path: &str,
    ) -> GateOutcome {
        if session.is_loading {
            return GateOutcome::Placeholder;
        }
        if !session.is_authenticated {
            return GateOutcome::RedirectToLogin(provider.login_with_redirect(return_path));
        }
        match &session.user {
            Some(user) if self.is_allowed(user) => GateOutcome::Render,
            _ => GateOutcome::LoggedOut(provider.logout(&self.origin)),
        }
    }

    pub fn is_allowed(&self, user: &UserProfile) -> bool {
        user.family_name == self.allowed_family_name
    }

    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.origin)
    }
}

/// Nav control reflecting the session: spinner, login arrow or greeting.
pub fn affordance(session: &SessionView) -> Markup {
    if session.is_loading {
        return html! { div.loader { "🌀" } };
    }
    match (&session.user, session.is_authenticated) {
        (Some(user), true) => html! {
            a.auth-action href="/logout" title="Logout" { "Hi " (user.given_name) }
        },
        _ => html! {
            a.auth-action href="/login" title="Log In" { "➡️" }
        },
    }
}

// ============================================================================
// Hosted login
// ============================================================================

/// A login started by `/login` and not yet completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub verifier: String,
    pub return_path: String,
    pub started: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Authorization-code login against the hosted provider.
pub struct HostedLogin {
    context: AuthContext,
    agent: Agent,
    pending: HashMap<String, PendingLogin>,
}

impl HostedLogin {
    pub fn new(context: AuthContext) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(TOKEN_TIMEOUT_SECS)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            context,
            agent,
            pending: HashMap::new(),
        }
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    /// Number of logins waiting for their callback.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn authorize_url(&self, state: &str, challenge: &str) -> String {
        format!(
            "https://{}/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            self.context.domain,
            urlencoding::encode(&self.context.client_id),
            urlencoding::encode(&self.context.callback_url()),
            urlencoding::encode("openid profile"),
            urlencoding::encode(state),
            urlencoding::encode(challenge),
        )
    }

    pub fn logout_url(&self, return_to: &str) -> String {
        format!(
            "https://{}/v2/logout?client_id={}&returnTo={}",
            self.context.domain,
            urlencoding::encode(&self.context.client_id),
            urlencoding::encode(return_to),
        )
    }

    /// Claim the pending login for `state`. Each state can be claimed once.
    pub fn take_pending(&mut self, state: &str) -> Result<PendingLogin, AuthError> {
        self.take_pending_at(state, Instant::now())
    }

    /// Claim as of `now`; a login older than [`PENDING_LOGIN_TTL`] is gone.
    pub fn take_pending_at(
        &mut self,
        state: &str,
        now: Instant,
    ) -> Result<PendingLogin, AuthError> {
        match self.pending.remove(state) {
            Some(pending) if now.duration_since(pending.started) <= PENDING_LOGIN_TTL => {
                Ok(pending)
            }
            _ => Err(AuthError::StateMismatch),
        }
    }

    /// Start a login as of `now`, returning the authorize URL.
    pub fn start_login_at(&mut self, return_path: &str, now: Instant) -> String {
        self.prune_pending(now);
        let state = random_token(16);
        let verifier = random_token(32);
        let url = self.authorize_url(&state, &pkce_challenge(&verifier));
        self.pending.insert(
            state,
            PendingLogin {
                verifier,
                return_path: safe_return_path(return_path),
                started: now,
            },
        );
        url
    }

    /// Drop expired logins, then the oldest ones until a new one fits.
    fn prune_pending(&mut self, now: Instant) {
        self.pending
            .retain(|_, p| now.duration_since(p.started) <= PENDING_LOGIN_TTL);
        while self.pending.len() >= MAX_PENDING_LOGINS {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, p)| p.started)
                .map(|(state, _)| state.clone());
            match oldest {
                Some(state) => {
                    self.pending.remove(&state);
                }
                None => break,
            }
        }
    }

    fn exchange_code(&self, code: &str, verifier: &str) -> Result<String, AuthError> {
        let url = format!("https://{}/oauth/token", self.context.domain);
        let callback = self.context.callback_url();
        let response = self.agent.post(&url).send_form([
            ("grant_type", "authorization_code"),
            ("client_id", self.context.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", callback.as_str()),
        ])?;

        let status = response.status().as_u16();
        let body = response.into_body().read_to_string()?;
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::TokenExchange(format!("unreadable response ({status}): {e}")))?;

        if let Some(error) = token.error {
            let detail = token.error_description.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!("{error}: {detail}")));
        }
        if status >= 400 {
            return Err(AuthError::TokenExchange(format!("status {status}")));
        }
        token
            .id_token
            .ok_or_else(|| AuthError::TokenExchange("response has no id_token".into()))
    }
}

impl IdentityProvider for HostedLogin {
    fn login_with_redirect(&mut self, return_path: &str) -> String {
        self.start_login_at(return_path, Instant::now())
    }

    fn logout(&mut self, return_to: &str) -> String {
        self.logout_url(return_to)
    }
}

impl HostedProvider for HostedLogin {
    fn complete_login(
        &mut self,
        code: &str,
        state: &str,
    ) -> Result<(UserProfile, String), AuthError> {
        let pending = self.take_pending(state)?;
        let id_token = self.exchange_code(code, &pending.verifier)?;
        let user = decode_id_token(&id_token)?;
        Ok((user, pending.return_path))
    }
}

/// Only same-site absolute paths are followed after login.
///
/// Browsers read `/\` as `//`, so any backslash is refused too.
pub fn safe_return_path(path: &str) -> String {
    if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') {
        path.to_string()
    } else {
        "/".to_string()
    }
}

/// URL-safe random string of `bytes` random bytes.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// S256 code challenge for a PKCE verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Read the user's names from an ID token payload.
///
/// The token arrives straight from the provider's token endpoint over TLS, so
/// the signature is not checked here.
pub fn decode_id_token(token: &str) -> Result<UserProfile, AuthError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(AuthError::MalformedIdToken(
                "expected three dot-separated parts".into(),
            ));
        }
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedIdToken(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedIdToken(format!("payload is not JSON: {e}")))
}
