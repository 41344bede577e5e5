use std::fmt;

use thiserror::Error;

/// Bearer token for the Cogniz memory API.
///
/// `Debug` is redacted so a credential never ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for blank input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for the outbound `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where a per-request credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    AuthorizationHeader,
    QueryParameter,
    ProcessDefault,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialSource::AuthorizationHeader => "authorization_header",
            CredentialSource::QueryParameter => "query_parameter",
            CredentialSource::ProcessDefault => "process_default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error(
        "Error: Authentication required. Provide your Cogniz API key either as an \
         'Authorization: Bearer <api_key>' header or as an 'api_key' query parameter \
         on the MCP endpoint URL (e.g. /mcp?api_key=<api_key>)."
    )]
    Missing,
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// Other schemes and empty tokens yield `None`.
pub fn parse_bearer(raw: &str) -> Option<Credential> {
    let mut parts = raw.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Credential::new(token)
}

/// Resolve the credential for one inbound request (priority order):
/// 1. `Authorization: Bearer <token>` header
/// 2. `api_key` query parameter
/// 3. process-wide fallback configured at startup
/// 4. `AuthError::Missing`
pub fn resolve_request_credential(
    authorization: Option<&str>,
    query_api_key: Option<&str>,
    fallback: Option<&Credential>,
) -> Result<(Credential, CredentialSource), AuthError> {
    if let Some(credential) = authorization.and_then(parse_bearer) {
        return Ok((credential, CredentialSource::AuthorizationHeader));
    }
    if let Some(credential) = query_api_key.and_then(Credential::new) {
        return Ok((credential, CredentialSource::QueryParameter));
    }
    if let Some(credential) = fallback {
        return Ok((credential.clone(), CredentialSource::ProcessDefault));
    }
    Err(AuthError::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_wins_over_query_and_fallback() {
        let fallback = Credential::new("mp_fallback").unwrap();
        let (credential, source) = resolve_request_credential(
            Some("Bearer mp_header"),
            Some("mp_query"),
            Some(&fallback),
        )
        .unwrap();
        assert_eq!(credential.expose(), "mp_header");
        assert_eq!(source, CredentialSource::AuthorizationHeader);
    }

    #[test]
    fn query_wins_over_fallback() {
        let fallback = Credential::new("mp_fallback").unwrap();
        let (credential, source) =
            resolve_request_credential(None, Some("mp_query"), Some(&fallback)).unwrap();
        assert_eq!(credential.expose(), "mp_query");
        assert_eq!(source, CredentialSource::QueryParameter);
    }

    #[test]
    fn non_bearer_header_falls_through_to_next_source() {
        let (credential, source) =
            resolve_request_credential(Some("Basic dXNlcjpwYXNz"), Some("mp_query"), None)
                .unwrap();
        assert_eq!(credential.expose(), "mp_query");
        assert_eq!(source, CredentialSource::QueryParameter);
    }

    #[test]
    fn fallback_is_used_last() {
        let fallback = Credential::new("mp_fallback").unwrap();
        let (credential, source) =
            resolve_request_credential(Some("Bearer   "), Some(""), Some(&fallback)).unwrap();
        assert_eq!(credential.expose(), "mp_fallback");
        assert_eq!(source, CredentialSource::ProcessDefault);
    }

    #[test]
    fn missing_everywhere_names_both_methods() {
        let err = resolve_request_credential(None, None, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Authorization: Bearer"));
        assert!(message.contains("api_key"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(parse_bearer("bearer abc").unwrap().expose(), "abc");
        assert_eq!(parse_bearer("BEARER abc").unwrap().expose(), "abc");
        assert!(parse_bearer("Token abc").is_none());
        assert!(parse_bearer("Bearer").is_none());
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential = Credential::new("mp_secret").unwrap();
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.bearer_header(), "Bearer mp_secret");
    }
}
