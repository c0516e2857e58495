//! The JWT auth adapter: a thin decision-and-logging layer around a
//! standard JWT validation library. It never wraps the health endpoint,
//! only the invocation path.

use crate::{config::Config, werror::AuthError, Request};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub exp: usize,
}

/// Where a production (non-`jwt_auth_local`) deployment expects its RSA
/// public key, mounted the same way the Kubernetes service-account
/// namespace file is: a fixed path, not a configuration variable.
const PUBLIC_KEY_PATH: &str = "/var/openfaas/secrets/jwt-public-key";

/// Holds the resolved function identity and verification key; built once
/// at startup from [`Config`].
pub struct Auth {
    enabled: bool,
    debug: bool,
    function_name: String,
    namespace: String,
    algorithm: Algorithm,
    key: Option<DecodingKey>,
}

impl Auth {
    pub fn from_config(config: &Config) -> Self {
        let (algorithm, key) = if config.jwt_auth_local {
            // Development-only: a fixed local HMAC key, never used for a
            // real identity provider's signature.
            (
                Algorithm::HS256,
                Some(DecodingKey::from_secret(b"procwatch-local-dev-key")),
            )
        } else {
            let key = std::fs::read(PUBLIC_KEY_PATH)
                .ok()
                .and_then(|pem| DecodingKey::from_rsa_pem(&pem).ok());
            if key.is_none() && config.jwt_auth {
                tracing::warn!(path = PUBLIC_KEY_PATH, "jwt_auth is enabled but no public key was found; all requests will be rejected");
            }
            (Algorithm::RS256, key)
        };

        Self {
            enabled: config.jwt_auth,
            debug: config.jwt_auth_debug,
            function_name: config.openfaas_name.clone().unwrap_or_default(),
            namespace: resolve_namespace(config),
            algorithm,
            key,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validates the bearer token on `req`. Only called when auth is
    /// enabled; the caller is responsible for skipping the health endpoint.
    pub fn validate(&self, req: &Request) -> Result<Claims, AuthError> {
        let token = bearer_token(req).ok_or(AuthError::MissingToken)?;
        let key = self.key.as_ref().ok_or(AuthError::NoKey)?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, key, &validation)?;

        if self.debug {
            tracing::debug!(
                function = %self.function_name,
                namespace = %self.namespace,
                subject = ?data.claims.sub,
                "jwt claims validated"
            );
        }

        Ok(data.claims)
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    let raw = req.header(b"authorization")?;
    let raw = std::str::from_utf8(raw).ok()?;
    raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))
}

fn resolve_namespace(config: &Config) -> String {
    if let Some(ns) = &config.openfaas_namespace {
        return ns.clone();
    }
    std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/namespace")
        .unwrap_or_default()
        .trim()
        .to_string()
}
