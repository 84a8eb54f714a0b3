//! Connection authorization at websocket upgrade time.

use crate::ports::{AccountService, AccountServiceError, CertAccountExtractor};
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gateway_types::{Account, AccountId};
use thiserror::Error;
use tracing::{error, warn};

/// Authorization failures; the server closes the connection with a delay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("failed parsing the authorization header")]
    BadHeader,

    #[error("missing authorization")]
    Missing,

    #[error("account is not authorized to get other accounts information")]
    Unauthorized,

    #[error("account must be enterprise / enterprise elite / ultra")]
    InsufficientTier,

    #[error("wrong value in the authorization header")]
    WrongSecret,
}

/// Pull the presented account ID and secret hash off the upgrade request:
/// a base64 `accountID:secretHash` Authorization header, or — with TLS
/// enabled and no header — an account ID from the client certificate.
pub fn credentials_from_request(
    headers: &HeaderMap,
    tls_enabled: bool,
    cert_extractor: Option<&dyn CertAccountExtractor>,
) -> Result<(AccountId, String), AuthError> {
    if let Some(token) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if !token.is_empty() {
            let payload = STANDARD.decode(token).map_err(|_| AuthError::BadHeader)?;
            let decoded = String::from_utf8(payload).map_err(|_| AuthError::BadHeader)?;
            let (account_id, secret_hash) =
                decoded.split_once(':').ok_or(AuthError::BadHeader)?;
            if account_id.is_empty() {
                return Err(AuthError::Missing);
            }
            return Ok((AccountId::from(account_id), secret_hash.to_string()));
        }
    }

    if tls_enabled {
        if let Some(account_id) =
            cert_extractor.and_then(|extractor| extractor.account_from_headers(headers))
        {
            if !account_id.is_empty() {
                return Ok((account_id, String::new()));
            }
        }
    }

    Err(AuthError::Missing)
}

/// Resolve the connection's account model.
///
/// A foreign account ID is re-verified with the SDN: an unauthorized answer
/// rejects the connection, any other SDN failure falls back to a
/// default-elite profile for the presented ID. Accounts below enterprise
/// tier are rejected, as is a non-empty secret hash that does not match.
pub async fn authorize(
    account_id: AccountId,
    secret_hash: String,
    gateway_account: &Account,
    accounts: &dyn AccountService,
) -> Result<Account, AuthError> {
    let model = if account_id == gateway_account.account_id {
        gateway_account.clone()
    } else {
        let model = match accounts.customer_account(&account_id).await {
            Ok(model) => model,
            Err(AccountServiceError::Unauthorized) => {
                error!(
                    account_id = %account_id,
                    "Account is not authorized to query other account information"
                );
                return Err(AuthError::Unauthorized);
            }
            Err(AccountServiceError::Other(e)) => {
                error!(account_id = %account_id, error = %e, "Failed to get customer account model");
                let mut fallback = Account::default_elite(account_id.clone());
                fallback.secret_hash = secret_hash.clone();
                fallback
            }
        };
        if !model.tier.is_enterprise() {
            warn!(
                account_id = %account_id,
                tier = %model.tier,
                "Customer account below enterprise tier"
            );
            return Err(AuthError::InsufficientTier);
        }
        model
    };

    if model.secret_hash != secret_hash && !secret_hash.is_empty() {
        error!(account_id = %account_id, "Account sent a mismatched secret hash");
        return Err(AuthError::WrongSecret);
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_types::AccountTier;
    use serde_json::Value;

    struct StubAccounts {
        response: Result<Account, AccountServiceError>,
    }

    #[async_trait]
    impl AccountService for StubAccounts {
        async fn customer_account(
            &self,
            _account_id: &AccountId,
        ) -> Result<Account, AccountServiceError> {
            self.response.clone()
        }

        async fn quota_usage(
            &self,
            _account_id: &AccountId,
        ) -> Result<Value, AccountServiceError> {
            Ok(Value::Null)
        }
    }

    fn gateway_account() -> Account {
        let mut account = Account::default_elite(AccountId::from("gateway"));
        account.secret_hash = "s3cret".to_string();
        account
    }

    fn auth_header(payload: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", STANDARD.encode(payload).parse().unwrap());
        headers
    }

    #[test]
    fn test_credentials_from_header() {
        let headers = auth_header("acct-1:deadbeef");
        let (account_id, secret) = credentials_from_request(&headers, false, None).unwrap();
        assert_eq!(account_id.as_str(), "acct-1");
        assert_eq!(secret, "deadbeef");
    }

    #[test]
    fn test_credentials_require_separator() {
        let headers = auth_header("acct-without-secret");
        assert_eq!(
            credentials_from_request(&headers, false, None).unwrap_err(),
            AuthError::BadHeader
        );
    }

    #[test]
    fn test_credentials_missing() {
        let headers = HeaderMap::new();
        assert_eq!(
            credentials_from_request(&headers, false, None).unwrap_err(),
            AuthError::Missing
        );
    }

    #[tokio::test]
    async fn test_gateway_account_matches_directly() {
        let gateway = gateway_account();
        let accounts = StubAccounts {
            response: Err(AccountServiceError::Unauthorized),
        };
        let model = authorize(
            AccountId::from("gateway"),
            "s3cret".to_string(),
            &gateway,
            &accounts,
        )
        .await
        .unwrap();
        assert_eq!(model.account_id.as_str(), "gateway");
    }

    #[tokio::test]
    async fn test_sdn_unauthorized_rejects() {
        let gateway = gateway_account();
        let accounts = StubAccounts {
            response: Err(AccountServiceError::Unauthorized),
        };
        let err = authorize(
            AccountId::from("other"),
            String::new(),
            &gateway,
            &accounts,
        )
        .await
        .unwrap_err();
        assert_eq!(err, AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_sdn_failure_grants_default_elite() {
        let gateway = gateway_account();
        let accounts = StubAccounts {
            response: Err(AccountServiceError::Other("sdn down".to_string())),
        };
        let model = authorize(
            AccountId::from("other"),
            "hash".to_string(),
            &gateway,
            &accounts,
        )
        .await
        .unwrap();
        assert_eq!(model.account_id.as_str(), "other");
        assert!(model.tier.is_elite());
    }

    #[tokio::test]
    async fn test_low_tier_rejected() {
        let gateway = gateway_account();
        let mut customer = Account::default_elite(AccountId::from("dev"));
        customer.tier = AccountTier::Developer;
        let accounts = StubAccounts {
            response: Ok(customer),
        };
        let err = authorize(AccountId::from("dev"), String::new(), &gateway, &accounts)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InsufficientTier);
    }

    #[tokio::test]
    async fn test_mismatched_secret_rejected() {
        let gateway = gateway_account();
        let accounts = StubAccounts {
            response: Err(AccountServiceError::Unauthorized),
        };
        let err = authorize(
            AccountId::from("gateway"),
            "wrong".to_string(),
            &gateway,
            &accounts,
        )
        .await
        .unwrap_err();
        assert_eq!(err, AuthError::WrongSecret);

        // An empty secret is tolerated.
        let model = authorize(
            AccountId::from("gateway"),
            String::new(),
            &gateway,
            &accounts,
        )
        .await
        .unwrap();
        assert_eq!(model.account_id.as_str(), "gateway");
    }
}
