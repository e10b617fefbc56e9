//! Authenticated Threads user profile

use serde::{Deserialize, Serialize};

use crate::config::OAuthConfig;
use crate::constants::USER_FIELDS;
use crate::error::{Error, Result};

/// External identity snapshot fetched from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThreadsUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads_profile_picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads_biography: Option<String>,
}

/// The profile endpoint answers with the object itself or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileBody {
    Wrapped { data: Vec<ThreadsUser> },
    Bare(ThreadsUser),
}

/// Fetch the profile of the user owning `access_token`.
pub async fn get_threads_user(
    client: &reqwest::Client,
    config: &OAuthConfig,
    access_token: &str,
) -> Result<ThreadsUser> {
    let response = client
        .get(config.graph_url("/me"))
        .bearer_auth(access_token)
        .query(&[("fields", USER_FIELDS)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("profile request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::UserProfile(format!("{status}: {body}")));
    }

    let body = response
        .json::<ProfileBody>()
        .await
        .map_err(|e| Error::MalformedResponse(format!("invalid profile response: {e}")))?;

    match body {
        ProfileBody::Bare(user) => Ok(user),
        ProfileBody::Wrapped { data } => data
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedResponse("No user data returned".into())),
    }
}
