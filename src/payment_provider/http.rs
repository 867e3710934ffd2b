use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    CheckoutSession, CheckoutStatus, CreateCheckout, PaymentProvider, PaymentStatus,
    ProviderError,
};

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Provider client over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpPaymentProvider {
    client: Client,
    base_url: Url,
}

impl HttpPaymentProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::Config(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Config(format!(
                "base url {base_url} cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Config("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(%status, "payment provider returned a transient error");
            return Err(ProviderError::Unavailable(format!(
                "provider responded with {status}"
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(%status, "payment provider rejected request");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(err.to_string())
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    #[instrument(skip(self, secret_key, request), fields(order_id = %request.order_id, attempt_id = %request.attempt_id))]
    async fn create_checkout(
        &self,
        secret_key: &str,
        request: &CreateCheckout,
    ) -> Result<CheckoutSession, ProviderError> {
        let body = json!({
            "amount": request.amount,
            "currency": request.currency,
            "successUrl": request.success_url,
            "cancelUrl": request.cancel_url,
            "failureUrl": request.failure_url,
            "metadata": {
                "orderId": request.order_id.to_string(),
                "attemptId": request.attempt_id.to_string(),
            },
        });

        let response = self
            .client
            .post(self.endpoint(&["api", "checkouts"])?)
            .bearer_auth(secret_key)
            .header(IDEMPOTENCY_KEY_HEADER, request.attempt_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let session: CheckoutSession = Self::read_json(response).await?;
        debug!(checkout_id = %session.id, "checkout session created");
        Ok(session)
    }

    #[instrument(skip(self, secret_key))]
    async fn get_checkout(
        &self,
        secret_key: &str,
        checkout_id: &str,
    ) -> Result<CheckoutStatus, ProviderError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "checkouts", checkout_id])?)
            .bearer_auth(secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response).await
    }

    #[instrument(skip(self, secret_key))]
    async fn get_payment(
        &self,
        secret_key: &str,
        payment_id: &str,
    ) -> Result<PaymentStatus, ProviderError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "payments", payment_id])?)
            .bearer_auth(secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpPaymentProvider {
        HttpPaymentProvider::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    fn checkout_request() -> CreateCheckout {
        CreateCheckout {
            amount: 15000,
            currency: "ZAR".into(),
            success_url: "https://shop.test/success".into(),
            cancel_url: "https://shop.test/cancel".into(),
            failure_url: "https://shop.test/failure".into(),
            order_id: Uuid::new_v4(),
            attempt_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn create_checkout_sends_amount_metadata_and_idempotency_key() {
        let server = MockServer::start().await;
        let request = checkout_request();

        Mock::given(method("POST"))
            .and(path("/api/checkouts"))
            .and(header("authorization", "Bearer sk_test_abc"))
            .and(header("idempotency-key", request.attempt_id.to_string().as_str()))
            .and(body_partial_json(json!({
                "amount": 15000,
                "currency": "ZAR",
                "metadata": { "orderId": request.order_id.to_string() }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ch_123",
                "redirectUrl": "https://pay.test/ch_123",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = provider(&server)
            .create_checkout("sk_test_abc", &request)
            .await
            .unwrap();
        assert_eq!(session.id, "ch_123");
        assert_eq!(session.redirect_url, "https://pay.test/ch_123");
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/checkouts"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server)
            .create_checkout("sk", &checkout_request())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/checkouts/ch_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .get_checkout("sk", "ch_missing")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::Rejected {
                status: 404,
                message: "not found".into()
            }
        );
    }

    #[tokio::test]
    async fn reads_checkout_and_payment_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/checkouts/ch_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ch_1",
                "status": "completed",
                "paymentId": "p_9"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/payments/p_9"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "p_9", "status": "succeeded" })),
            )
            .mount(&server)
            .await;

        let provider = provider(&server);
        let checkout = provider.get_checkout("sk", "ch_1").await.unwrap();
        assert_eq!(checkout.status, "completed");
        assert_eq!(checkout.payment_id.as_deref(), Some("p_9"));

        let payment = provider.get_payment("sk", "p_9").await.unwrap();
        assert_eq!(payment.status, "succeeded");
    }

    #[tokio::test]
    async fn provider_ids_are_escaped_as_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/checkouts/ch%2F..%2Fpayments%3Fx=1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "started" })))
            .expect(1)
            .mount(&server)
            .await;

        let checkout = provider(&server)
            .get_checkout("sk", "ch/../payments?x=1")
            .await
            .unwrap();
        assert_eq!(checkout.status, "started");
    }

    #[test]
    fn endpoint_keeps_prefix_with_or_without_trailing_slash() {
        for base in ["https://pay.test/v2", "https://pay.test/v2/"] {
            let provider = HttpPaymentProvider::new(base, Duration::from_secs(1)).unwrap();
            assert_eq!(
                provider.endpoint(&["api", "payments", "p 1"]).unwrap().as_str(),
                "https://pay.test/v2/api/payments/p%201"
            );
        }
        let root = HttpPaymentProvider::new("https://pay.test", Duration::from_secs(1)).unwrap();
        assert_eq!(
            root.endpoint(&["api", "checkouts"]).unwrap().as_str(),
            "https://pay.test/api/checkouts"
        );
    }

    #[test]
    fn non_hierarchical_base_url_is_rejected() {
        assert!(matches!(
            HttpPaymentProvider::new("mailto:payments@pay.test", Duration::from_secs(1)),
            Err(ProviderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn base_url_with_path_prefix_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/api/payments/p_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "approved" })))
            .mount(&server)
            .await;

        let provider =
            HttpPaymentProvider::new(&format!("{}/v2", server.uri()), Duration::from_secs(2))
                .unwrap();
        assert_eq!(
            provider.get_payment("sk", "p_1").await.unwrap().status,
            "approved"
        );
    }
}
