use std::sync::Arc;

use cogniz_core::auth::{AuthError, Credential, CredentialSource, resolve_request_credential};
use cogniz_mcp_runtime::McpServer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tenancy {
    /// Each request brings its own key; the process key is a fallback.
    Multi,
    /// Every request uses the process key; request credentials are ignored.
    Single,
}

impl Tenancy {
    pub fn as_str(self) -> &'static str {
        match self {
            Tenancy::Multi => "multi_tenant",
            Tenancy::Single => "single_tenant",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
    pub tenancy: Tenancy,
    pub fallback_credential: Option<Credential>,
}

impl AppState {
    pub fn new(server: McpServer, tenancy: Tenancy, fallback_credential: Option<Credential>) -> Self {
        Self {
            server: Arc::new(server),
            tenancy,
            fallback_credential,
        }
    }

    /// Credential for one inbound request.
    pub fn request_credential(
        &self,
        authorization: Option<&str>,
        query_api_key: Option<&str>,
    ) -> Result<(Credential, CredentialSource), AuthError> {
        match self.tenancy {
            Tenancy::Single => self
                .fallback_credential
                .clone()
                .map(|credential| (credential, CredentialSource::ProcessDefault))
                .ok_or(AuthError::Missing),
            Tenancy::Multi => resolve_request_credential(
                authorization,
                query_api_key,
                self.fallback_credential.as_ref(),
            ),
        }
    }
}
