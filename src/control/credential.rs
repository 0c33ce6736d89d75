//! Credential id used for quota and consumer attribution.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Identity claims of a verified JWT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JwtIdentity {
    pub issuer: String,
    pub audiences: Vec<String>,
}

/// Precedence: API key, then JWT issuer (+ audience when there is exactly one), then anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialId {
    ApiKey(String),
    Jwt { issuer: String, audience: Option<String> },
    Anonymous,
}

impl CredentialId {
    pub fn derive(api_key: Option<&str>, jwt: Option<&JwtIdentity>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            return CredentialId::ApiKey(key.to_string());
        }
        match jwt.filter(|j| !j.issuer.is_empty()) {
            Some(identity) => CredentialId::Jwt {
                issuer: identity.issuer.clone(),
                audience: match identity.audiences.as_slice() {
                    [single] => Some(single.clone()),
                    _ => None,
                },
            },
            None => CredentialId::Anonymous,
        }
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialId::ApiKey(key) => write!(f, "apikey:{}", key),
            CredentialId::Jwt { issuer, audience } => {
                write!(f, "jwtauth:issuer={}", URL_SAFE_NO_PAD.encode(issuer))?;
                if let Some(aud) = audience {
                    write!(f, "&audience={}", URL_SAFE_NO_PAD.encode(aud))?;
                }
                Ok(())
            }
            CredentialId::Anonymous => f.write_str("anonymous"),
        }
    }
}
