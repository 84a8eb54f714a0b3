//! Account service used by gateways that cannot query the SDN for other
//! accounts: only the gateway's own account resolves, everything else is
//! unauthorized.

use async_trait::async_trait;
use gateway_types::{Account, AccountId};
use gateway_ws::{AccountService, AccountServiceError};
use serde_json::{json, Value};

pub struct LocalAccountService {
    gateway_account: Account,
}

impl LocalAccountService {
    #[must_use]
    pub fn new(gateway_account: Account) -> Self {
        Self { gateway_account }
    }
}

#[async_trait]
impl AccountService for LocalAccountService {
    async fn customer_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Account, AccountServiceError> {
        if *account_id == self.gateway_account.account_id {
            Ok(self.gateway_account.clone())
        } else {
            Err(AccountServiceError::Unauthorized)
        }
    }

    async fn quota_usage(&self, account_id: &AccountId) -> Result<Value, AccountServiceError> {
        Ok(json!({
            "account_id": account_id.as_str(),
            "quota_filled": 0,
            "quota_limit": 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_own_account_resolves() {
        let gateway = Account::default_elite(AccountId::from("gw"));
        let service = LocalAccountService::new(gateway);

        assert!(service
            .customer_account(&AccountId::from("gw"))
            .await
            .is_ok());
        assert!(matches!(
            service.customer_account(&AccountId::from("other")).await,
            Err(AccountServiceError::Unauthorized)
        ));
    }
}
