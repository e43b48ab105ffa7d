//! 🔑 Session establishment -- stage one. Get in, or get out.
//!
//! The portal is polite: hand it bad or missing credentials and it will
//! happily let you in *anonymously*. Anonymous can read public items. Anonymous
//! cannot read usage statistics. So an anonymous "success" is a failure wearing
//! a nice shirt, and we treat it like one.

use tracing::{info, warn};

use crate::portal::ContentService;

/// 🔒 Portal credentials, read from the process environment.
///
/// Empty strings count as absent. `Debug` never prints the password.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()).filter(|v| !v.trim().is_empty()),
            password: Some(password.into()).filter(|v| !v.trim().is_empty()),
        }
    }

    /// 🌍 Read the two named variables. Missing or blank means anonymous.
    pub fn from_env(username_var: &str, password_var: &str) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            username: read(username_var),
            password: read(password_var),
        }
    }

    /// ✅ Both halves present. Half a credential is no credential.
    pub fn is_complete(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// 🎫 An established portal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// 📡 Portal root URL, no trailing slash.
    pub url: String,
    /// 🏢 The portal's own id, needed for the usage endpoint.
    pub portal_id: Option<String>,
    /// 🎟️ Access token, if we got one.
    pub token: Option<String>,
    /// 👤 Who the portal thinks we are. `None` = anonymous.
    pub username: Option<String>,
}

impl Session {
    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
    }
}

/// 💀 Why we couldn't get a usable session. Both kinds end the run.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 🔒 We got in, but as nobody. Nobody can't read usage stats.
    #[error(
        "🔒 connected to {url} anonymously; usage statistics need a named account \
         (check the credential environment variables)"
    )]
    Permission { url: String },
    /// 📡 Couldn't talk to the portal, or it rejected the sign-in outright.
    #[error("📡 could not connect to {url}")]
    Connection {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

/// 🚀 Stage one: authenticate and insist on a named session.
pub async fn establish_session<P>(
    portal: &P,
    credentials: &Credentials,
) -> Result<Session, SessionError>
where
    P: ContentService + ?Sized,
{
    if !credentials.is_complete() {
        warn!("⚠️ Portal credentials are missing or incomplete; the portal will see an anonymous visitor");
    }

    let session = portal.authenticate(credentials).await?;

    if session.is_anonymous() {
        return Err(SessionError::Permission { url: session.url });
    }

    info!(
        "✅ Connected to {} as {}",
        session.url,
        session.username.as_deref().unwrap_or_default()
    );
    Ok(session)
}
