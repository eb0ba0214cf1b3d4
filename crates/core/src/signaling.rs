//! SDP offer/answer exchange with the remote realtime endpoint.

use crate::{credential::EphemeralKey, error::NegotiationError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Sends a local offer and returns the remote answer SDP.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SdpSignaler: Send + Sync {
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: &EphemeralKey,
    ) -> Result<String, NegotiationError>;
}

/// Posts the offer as `application/sdp` to `{realtime_url}?model={model}`.
pub struct HttpSignaler {
    client: reqwest::Client,
    realtime_url: String,
    model: String,
}

impl HttpSignaler {
    pub fn new(
        client: reqwest::Client,
        realtime_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            realtime_url: realtime_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl SdpSignaler for HttpSignaler {
    #[instrument(name = "exchange_sdp", skip_all, fields(url = %self.realtime_url, model = %self.model))]
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: &EphemeralKey,
    ) -> Result<String, NegotiationError> {
        let response = self
            .client
            .post(&self.realtime_url)
            .query(&[("model", self.model.as_str())])
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_owned())
            .send()
            .await
            .map_err(NegotiationError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NegotiationError::Status(status.as_u16()));
        }

        let answer = response
            .text()
            .await
            .map_err(|e| NegotiationError::MalformedAnswer(e.to_string()))?;
        validate_answer(&answer)?;

        debug!(answer_len = answer.len(), "Received SDP answer");
        Ok(answer)
    }
}

/// An SDP body always begins with the protocol version line.
fn validate_answer(answer: &str) -> Result<(), NegotiationError> {
    if answer.trim_start().starts_with("v=") {
        Ok(())
    } else if answer.trim().is_empty() {
        Err(NegotiationError::MalformedAnswer("empty body".to_string()))
    } else {
        Err(NegotiationError::MalformedAnswer(
            "body is not a session description".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string, header, method, path, query_param},
    };

    const OFFER: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\n";
    const ANSWER: &str = "v=0\r\no=- 3 4 IN IP4 10.0.0.1\r\ns=-\r\n";

    fn signaler_for(server: &MockServer) -> HttpSignaler {
        HttpSignaler::new(
            reqwest::Client::new(),
            format!("{}/v1/realtime", server.uri()),
            "gpt-4o-realtime-preview-2024-12-17",
        )
    }

    #[tokio::test]
    async fn test_exchange_posts_offer_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime"))
            .and(query_param("model", "gpt-4o-realtime-preview-2024-12-17"))
            .and(header("authorization", "Bearer ek_abc"))
            .and(header("content-type", "application/sdp"))
            .and(body_string(OFFER))
            .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER))
            .expect(1)
            .mount(&server)
            .await;

        let answer = signaler_for(&server)
            .exchange(OFFER, &EphemeralKey::new("ek_abc"))
            .await
            .unwrap();
        assert_eq!(answer, ANSWER);
    }

    #[tokio::test]
    async fn test_exchange_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = signaler_for(&server)
            .exchange(OFFER, &EphemeralKey::new("expired"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::Status(401)));
    }

    #[tokio::test]
    async fn test_exchange_rejects_malformed_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = signaler_for(&server)
            .exchange(OFFER, &EphemeralKey::new("ek_abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::MalformedAnswer(_)));
    }

    #[test]
    fn test_validate_answer() {
        assert!(validate_answer(ANSWER).is_ok());
        assert!(validate_answer("  \n").is_err());
        assert!(validate_answer("{\"error\":1}").is_err());
    }
}
