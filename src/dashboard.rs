//! The authenticated area.
//!
//! Entering it needs a signed-in user with a profile row; otherwise the visitor
//! is sent to sign in or to finish signing up. The page shows the profile and
//! the user's active device connections.

use crate::auth::{AuthError, AuthService, User};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{instrument, warn};

pub const DASHBOARD_PATH: &str = "/dashboard";
pub const SIGNIN_PATH: &str = "/signin";
pub const SIGNUP_PATH: &str = "/signup";

/// Row of the `profiles` table, filled from the sign-up metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub marketing_emails: Option<bool>,
    #[serde(default)]
    pub consent_data_sharing: Option<bool>,
}

impl ProfileRecord {
    /// First name for greetings, falling back to the full name.
    #[must_use]
    pub fn greeting_name(&self) -> Option<&str> {
        self.first_name
            .as_deref()
            .or(self.last_name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}

/// Row of `health_data_connections`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Connection {
    pub id: String,
    pub device_type: String,
    #[serde(default)]
    pub device_id: Option<String>,
    pub connection_status: String,
    #[serde(default)]
    pub last_sync: Option<String>,
}

impl Connection {
    /// `apple-watch` reads as `apple watch`.
    #[must_use]
    pub fn device_label(&self) -> String {
        self.device_type.replacen('-', " ", 1)
    }
}

/// Reads of the data API made on behalf of the signed-in user.
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// The user's profile row, `None` when sign-up never created one.
    async fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRecord>, AuthError>;

    /// Connections of the user whose status is `active`.
    async fn active_connections(&self, user_id: &str) -> Result<Vec<Connection>, AuthError>;
}

#[derive(Debug)]
pub struct Dashboard {
    pub user: User,
    pub profile: ProfileRecord,
    pub connections: Vec<Connection>,
}

#[derive(Debug)]
pub enum DashboardGate {
    /// Not allowed in; go to this path instead.
    Redirect(&'static str),
    Ready(Dashboard),
}

/// Decide whether the visitor may enter the authenticated area and load it.
///
/// # Errors
/// Returns an error if the user or profile lookup fails. A failed connection
/// listing only logs and shows no devices.
#[instrument(skip_all)]
pub async fn open(
    auth: &dyn AuthService,
    profiles: &dyn ProfileService,
) -> Result<DashboardGate, AuthError> {
    let Some(user) = auth.get_user().await? else {
        return Ok(DashboardGate::Redirect(SIGNIN_PATH));
    };

    let Some(profile) = profiles.get_profile(&user.id).await? else {
        return Ok(DashboardGate::Redirect(SIGNUP_PATH));
    };

    let connections = profiles
        .active_connections(&user.id)
        .await
        .unwrap_or_else(|err| {
            warn!("Failed to list device connections: {err}");
            Vec::new()
        });

    Ok(DashboardGate::Ready(Dashboard {
        user,
        profile,
        connections,
    }))
}

/// Where "go to dashboard" leads: the dashboard with a session, sign-in without.
pub async fn return_destination(auth: &dyn AuthService) -> &'static str {
    match auth.get_session().await {
        Ok(Some(_)) => DASHBOARD_PATH,
        Ok(None) => SIGNIN_PATH,
        Err(err) => {
            warn!("Session lookup failed, sending to sign-in: {err}");
            SIGNIN_PATH
        }
    }
}
