//! Capability probe for the optional ChaosResult CRD
//!
//! Result synchronization is best-effort: clusters without the ChaosResult
//! CRD simply skip it. The answer is looked up once and cached for the
//! lifetime of the process.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client};
use tokio::sync::OnceCell;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::crd::RESULT_CRD_NAME;
use crate::Error;

/// Answers whether ChaosResults can be read in this cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResultCrdProbe: Send + Sync {
    /// True when the ChaosResult CRD is registered
    async fn result_crd_available(&self) -> Result<bool, Error>;
}

/// Uncached CRD lookup by name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CrdLookup: Send + Sync {
    /// True when a CRD with this name exists
    async fn crd_exists(&self, name: &str) -> Result<bool, Error>;
}

/// Lookup against the apiextensions API
pub struct ApiCrdLookup {
    client: Client,
}

#[async_trait]
impl CrdLookup for ApiCrdLookup {
    async fn crd_exists(&self, name: &str) -> Result<bool, Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }
}

/// Probe backed by the apiextensions API, cached after the first answer
pub struct KubeResultCrdProbe {
    lookup: Arc<dyn CrdLookup>,
    cached: OnceCell<bool>,
}

impl KubeResultCrdProbe {
    /// Create a new probe using the given client
    pub fn new(client: Client) -> Self {
        Self::with_lookup(Arc::new(ApiCrdLookup { client }))
    }

    /// Create a probe over a custom lookup (primarily for testing)
    pub fn with_lookup(lookup: Arc<dyn CrdLookup>) -> Self {
        Self {
            lookup,
            cached: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ResultCrdProbe for KubeResultCrdProbe {
    async fn result_crd_available(&self) -> Result<bool, Error> {
        let found = self
            .cached
            .get_or_try_init(|| async {
                let found = self.lookup.crd_exists(RESULT_CRD_NAME).await?;
                info!(crd = RESULT_CRD_NAME, found, "probed for ChaosResult CRD");
                Ok::<bool, Error>(found)
            })
            .await?;
        Ok(*found)
    }
}

/// Probe for namespace-scoped operators, which cannot list CRDs
pub struct AssumeResultCrdPresent;

#[async_trait]
impl ResultCrdProbe for AssumeResultCrdPresent {
    async fn result_crd_available(&self) -> Result<bool, Error> {
        Ok(true)
    }
}
