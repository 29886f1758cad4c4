//! Backend payment API client
//!
//! The four REST endpoints behind the payment flow, specified as a trait so
//! the controller and the reconciliation loop can run against test doubles.
//! `HttpBackend` is the production implementation: `reqwest` with a bearer
//! access token.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use crate::error::{FlowError, Result};
use crate::processor::types::{
    ApiErrorBody, PaymentMethodEnvelope, PaymentMethodRecord, SetupIntent,
    UpdatePaymentMethodRequest, UpdatePaymentMethodResponse,
};

/// Backend payment endpoints
#[async_trait::async_trait]
pub trait BackendApi: Send + Sync + 'static {
    /// `POST /api/stripe/create-setup-intent`
    async fn create_setup_intent(&self) -> Result<SetupIntent>;

    /// `POST /api/stripe/update-payment-method`
    async fn update_payment_method(&self, req: &UpdatePaymentMethodRequest) -> Result<()>;

    /// `POST /api/stripe/remove-payment-method`
    async fn remove_payment_method(&self, payment_method_id: &str) -> Result<()>;

    /// `GET /api/stripe/payment-methods`
    ///
    /// Returns `None` while the processor's write has not yet propagated
    /// into the backend's own store.
    async fn fetch_payment_method(&self) -> Result<Option<PaymentMethodRecord>>;
}

/// HTTP implementation of [`BackendApi`]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    access_token: String,
}

#[derive(Serialize)]
struct RemovePaymentMethodRequest<'a> {
    payment_method_id: &'a str,
}

impl HttpBackend {
    /// Create a client against the given API base URL
    pub fn new(api_base: &str, access_token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(api_base)
            .map_err(|e| FlowError::config(format!("invalid API base {api_base}: {e}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            access_token: access_token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| FlowError::config(format!("invalid endpoint {path}: {e}")))
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        ok_or_backend_error(resp).await
    }
}

/// Turn a non-2xx response into `FlowError::Backend` with its `{detail}`
async fn ok_or_backend_error(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail)
        .unwrap_or_else(|| default_detail(status));
    Err(FlowError::Backend {
        status: status.as_u16(),
        detail,
    })
}

fn default_detail(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
}

#[async_trait::async_trait]
impl BackendApi for HttpBackend {
    async fn create_setup_intent(&self) -> Result<SetupIntent> {
        let resp = self
            .post("/api/stripe/create-setup-intent", &serde_json::json!({}))
            .await?;
        Ok(resp.json::<SetupIntent>().await?)
    }

    async fn update_payment_method(&self, req: &UpdatePaymentMethodRequest) -> Result<()> {
        let resp = self.post("/api/stripe/update-payment-method", req).await?;
        let body = resp.json::<UpdatePaymentMethodResponse>().await?;
        if body.success {
            Ok(())
        } else {
            Err(FlowError::Backend {
                status: 200,
                detail: "Backend did not confirm the payment method update".to_string(),
            })
        }
    }

    async fn remove_payment_method(&self, payment_method_id: &str) -> Result<()> {
        self.post(
            "/api/stripe/remove-payment-method",
            &RemovePaymentMethodRequest { payment_method_id },
        )
        .await?;
        Ok(())
    }

    async fn fetch_payment_method(&self) -> Result<Option<PaymentMethodRecord>> {
        let url = self.endpoint("/api/stripe/payment-methods")?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let resp = ok_or_backend_error(resp).await?;
        let envelope = resp.json::<PaymentMethodEnvelope>().await?;
        Ok(envelope.payment_method)
    }
}
