//! Enrichment resolver
//!
//! Looks up auxiliary company and person data for a lead from an
//! external data provider, keyed by the lead's email. "No data found"
//! is a normal outcome and returns an empty enrichment; only provider
//! outages surface as errors, and the pipeline treats even those as
//! non-fatal.

use crate::types::{CompanyInfo, Enrichment, EnrichmentError, EnrichmentSource, Lead, PersonInfo};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Consumer mail providers whose domains identify no company
const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "proton.me",
];

/// Enrichment resolver configuration
///
/// Leaving `base_url` unset disables enrichment: the resolver then
/// always returns empty results without touching the network.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

/// External enrichment provider client
pub struct EnrichmentResolver {
    http_client: reqwest::Client,
    config: EnrichmentConfig,
}

impl EnrichmentResolver {
    pub fn new(config: EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let timeout = config
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// GET a provider endpoint; 404 means "no data", not an error
    async fn lookup<T: serde::de::DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, EnrichmentError> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), path);

        let mut request = self.http_client.get(&url).query(query);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Api(status.as_u16(), error_text));
        }

        let body = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;
        Ok(Some(body))
    }
}

#[async_trait::async_trait]
impl EnrichmentSource for EnrichmentResolver {
    async fn resolve(&self, lead: &Lead) -> Result<Enrichment, EnrichmentError> {
        let Some(base_url) = self.config.base_url.clone() else {
            return Ok(Enrichment::default());
        };

        // Company lookup keyed by email domain; consumer mail domains
        // identify no company, so skip the call entirely
        let company: Option<CompanyInfo> = match company_domain(&lead.email) {
            Some(domain) => {
                self.lookup(&base_url, "v1/companies/find", &[("domain", domain)])
                    .await?
            }
            None => None,
        };

        let person: Option<PersonInfo> = self
            .lookup(&base_url, "v1/people/find", &[("email", lead.email.as_str())])
            .await?;

        let enrichment = Enrichment { company, person };
        tracing::debug!(
            lead_id = %lead.id,
            has_company = enrichment.company.is_some(),
            has_person = enrichment.person.is_some(),
            "Enrichment resolved"
        );

        Ok(enrichment)
    }
}

/// Extract a company-identifying domain from an email address
///
/// Returns None for malformed addresses and consumer mail domains.
fn company_domain(email: &str) -> Option<&str> {
    let domain = email.rsplit_once('@')?.1;
    if domain.is_empty() || FREE_MAIL_DOMAINS.contains(&domain) {
        return None;
    }
    Some(domain)
}

// ============================================================================
// Tests
// ============================================================================
