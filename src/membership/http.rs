//! HTTP membership oracle
//!
//! Queries the channel membership service over HTTPS. The wire contract is
//! `GET {base}/members/{user_id}` returning `{"member": bool}`; a 404 means
//! the service has never seen the user and counts as a definitive NonMember.
//! Every transport or upstream failure collapses to `Unknown`.

use crate::config::MembershipConfig;
use crate::membership::oracle::{MembershipOracle, MembershipVerdict};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct MembershipResponse {
    member: bool,
}

#[derive(Clone)]
pub struct HttpMembershipOracle {
    client: Client,
    base_url: String,
}

impl HttpMembershipOracle {
    pub fn new(config: &MembershipConfig) -> Result<Self> {
        let mut client_builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("CloverEngine/1.0 (Membership Check)");

        if config.require_https {
            client_builder = client_builder.https_only(true);
            info!("HTTPS enforcement enabled for membership lookups");
        }

        let client = client_builder
            .build()
            .context("Failed to create membership HTTP client")?;

        Ok(Self {
            client,
            base_url: config.service_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MembershipOracle for HttpMembershipOracle {
    async fn is_member(&self, user_id: i64) -> MembershipVerdict {
        let url = format!("{}/members/{}", self.base_url, user_id);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Membership service unreachable");
                return MembershipVerdict::Unknown;
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            debug!(user_id = %user_id, "Membership service has no record for user");
            return MembershipVerdict::NonMember;
        }

        if !response.status().is_success() {
            warn!(
                user_id = %user_id,
                status = %response.status(),
                "Membership service returned an error status"
            );
            return MembershipVerdict::Unknown;
        }

        match response.json::<MembershipResponse>().await {
            Ok(body) => MembershipVerdict::from_flag(body.member),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Malformed membership response");
                MembershipVerdict::Unknown
            }
        }
    }
}
