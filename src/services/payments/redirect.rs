use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use tracing::{instrument, warn};

use crate::{config::RedirectGatewayConfig, errors::ServiceError};

use super::{new_transaction_ref, PaymentArtifact, PaymentContext, PaymentGateway, PaymentStatus};

type HmacSha512 = Hmac<Sha512>;

/// Signature parameter names, excluded from the signed set.
const SIGNATURE_PARAM: &str = "vnp_SecureHash";
const SIGNATURE_TYPE_PARAM: &str = "vnp_SecureHashType";

/// Provider response code meaning a successful payment.
pub const RESPONSE_CODE_SUCCESS: &str = "00";

/// State of a provider-side transaction, as reported by the status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTransactionState {
    /// Settled successfully on the provider side
    Paid,
    /// Still open; the customer can complete it through the existing URL
    Actionable,
    /// Cancelled, expired, or failed; a retry needs a fresh transaction
    Dead,
}

/// A verified, parsed provider callback.
#[derive(Debug, Clone)]
pub struct VerifiedCallback {
    pub transaction_ref: String,
    pub response_code: String,
    /// Amount in the provider's minor units (major × 100)
    pub amount_minor: i64,
}

/// Redirect/callback payment provider. One instance per configured
/// provider; credentials come in through `RedirectGatewayConfig` at
/// construction.
///
/// The wire convention follows the hosted-payment-page scheme the
/// storefront integrates with: every request and callback carries an
/// HMAC-SHA512 hex signature computed over the alphabetically-sorted,
/// unencoded `k=v` parameter set, excluding the signature fields
/// themselves.
pub struct RedirectGateway {
    cfg: RedirectGatewayConfig,
    http: reqwest::Client,
    expiry: Duration,
}

impl RedirectGateway {
    pub fn new(cfg: RedirectGatewayConfig, expiry_minutes: i64) -> Self {
        Self {
            cfg,
            http: reqwest::Client::new(),
            expiry: Duration::minutes(expiry_minutes),
        }
    }

    pub fn provider(&self) -> &str {
        &self.cfg.name
    }

    /// Canonical signature: sort keys, join unencoded `k=v` pairs with `&`,
    /// HMAC-SHA512 with the shared secret, lowercase hex.
    fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let sign_data = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let mut mac = HmacSha512::new_from_slice(self.cfg.hash_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(sign_data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Builds the signed hosted-payment-page URL for one transaction.
    pub fn build_payment_url(
        &self,
        ctx: &PaymentContext,
        transaction_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let amount_minor = to_minor_units(ctx.amount);

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), "2.1.0".to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert(
            "vnp_TmnCode".to_string(),
            self.cfg.merchant_code.clone(),
        );
        params.insert("vnp_Locale".to_string(), "vn".to_string());
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), transaction_ref.to_string());
        params.insert(
            "vnp_OrderInfo".to_string(),
            format!("Order {}", ctx.order_id),
        );
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Amount".to_string(), amount_minor.to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.cfg.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), ctx.client_ip.clone());
        params.insert(
            "vnp_CreateDate".to_string(),
            now.format("%Y%m%d%H%M%S").to_string(),
        );
        params.insert(
            "vnp_ExpireDate".to_string(),
            (now + self.expiry).format("%Y%m%d%H%M%S").to_string(),
        );

        let signature = self.sign(&params);

        let mut url = reqwest::Url::parse(&self.cfg.pay_url).map_err(|e| {
            ServiceError::ExternalServiceError(format!(
                "invalid pay_url for provider {}: {e}",
                self.cfg.name
            ))
        })?;
        for (k, v) in &params {
            url.query_pairs_mut().append_pair(k, v);
        }
        url.query_pairs_mut().append_pair(SIGNATURE_PARAM, &signature);
        Ok(url.to_string())
    }

    /// Verifies a callback's signature and parses the fields the
    /// reconciliation path needs. Rejection carries no detail: the payload
    /// is untrusted.
    #[instrument(skip(self, params))]
    pub fn verify_callback(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<VerifiedCallback, ServiceError> {
        let provided = params
            .get(SIGNATURE_PARAM)
            .ok_or(ServiceError::InvalidSignature)?
            .to_lowercase();

        let signed_set: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, _)| k.as_str() != SIGNATURE_PARAM && k.as_str() != SIGNATURE_TYPE_PARAM)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let expected = self.sign(&signed_set);
        if !constant_time_eq(&expected, &provided) {
            warn!(provider = %self.cfg.name, "Callback signature mismatch");
            return Err(ServiceError::InvalidSignature);
        }

        let transaction_ref = params
            .get("vnp_TxnRef")
            .cloned()
            .ok_or_else(|| ServiceError::ValidationError("missing vnp_TxnRef".to_string()))?;
        let response_code = params
            .get("vnp_ResponseCode")
            .cloned()
            .ok_or_else(|| ServiceError::ValidationError("missing vnp_ResponseCode".to_string()))?;
        let amount_minor = params
            .get("vnp_Amount")
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or_else(|| ServiceError::ValidationError("missing vnp_Amount".to_string()))?;

        Ok(VerifiedCallback {
            transaction_ref,
            response_code,
            amount_minor,
        })
    }

    /// Asks the provider for the current state of a transaction.
    #[instrument(skip(self))]
    pub async fn query_status(
        &self,
        transaction_ref: &str,
    ) -> Result<ProviderTransactionState, ServiceError> {
        let now = Utc::now();
        let mut params = BTreeMap::new();
        params.insert("vnp_Command".to_string(), "querydr".to_string());
        params.insert(
            "vnp_TmnCode".to_string(),
            self.cfg.merchant_code.clone(),
        );
        params.insert("vnp_TxnRef".to_string(), transaction_ref.to_string());
        params.insert(
            "vnp_RequestId".to_string(),
            new_transaction_ref(),
        );
        params.insert(
            "vnp_CreateDate".to_string(),
            now.format("%Y%m%d%H%M%S").to_string(),
        );
        let signature = self.sign(&params);
        params.insert(SIGNATURE_PARAM.to_string(), signature);

        let response = self
            .http
            .post(&self.cfg.query_url)
            .json(&params)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!(
                    "provider {} unreachable: {e}",
                    self.cfg.name
                ))
            })?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!(
                "provider {} returned malformed status: {e}",
                self.cfg.name
            ))
        })?;

        let status = body
            .get("vnp_TransactionStatus")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(match status {
            "00" => ProviderTransactionState::Paid,
            // Open or processing on the provider side
            "01" | "04" | "05" | "07" => ProviderTransactionState::Actionable,
            _ => ProviderTransactionState::Dead,
        })
    }
}

#[async_trait]
impl PaymentGateway for RedirectGateway {
    fn method(&self) -> &str {
        &self.cfg.name
    }

    fn is_asynchronous(&self) -> bool {
        true
    }

    async fn create_pending(
        &self,
        _txn: &DatabaseTransaction,
        ctx: &PaymentContext,
    ) -> Result<PaymentArtifact, ServiceError> {
        let transaction_ref = new_transaction_ref();
        let redirect_url = self.build_payment_url(ctx, &transaction_ref, Utc::now())?;
        Ok(PaymentArtifact {
            method: self.cfg.name.clone(),
            status: PaymentStatus::Pending,
            transaction_ref,
            redirect_url: Some(redirect_url),
        })
    }
}

/// Converts a major-unit amount to the provider's minor-unit integer
/// (amount × 100).
pub fn to_minor_units(amount: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .unwrap_or(i64::MAX)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
