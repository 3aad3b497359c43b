//! Protobuf-over-HTTP client for the config server.
//!
//! Both operations are `POST`s with `Content-Type: application/x-protobuf`
//! bodies. Request-id correlation is mandatory: a response carrying a
//! different `request_id` than the request is discarded and surfaces as
//! [`HttpError::RequestIdMismatch`], which callers treat as transient.

use std::time::Duration;

use prost::Message;
use thiserror::Error;
use tracing::debug;

use configserver_proto::{
    ConfigCheckResult, ConfigDetail, FetchPipelineConfigRequest, FetchPipelineConfigResponse,
    HeartBeatRequest, HeartBeatResponse,
};

use crate::address::ConfigServerAddress;

/// Common path prefix of the agent-facing operations.
const AGENT_ENDPOINT: &str = "/Agent";
/// Heartbeat operation name.
const HEARTBEAT_OPERATION: &str = "HeartBeat";
/// Config-fetch operation name.
const FETCH_OPERATION: &str = "FetchPipelineConfig";
/// Content type of every request body.
const TYPE_PROTOBUF: &str = "application/x-protobuf";

/// Error taxonomy of the config-server client.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport-level issue (DNS, socket, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Server answered with a non-success status.
    #[error("config server returned status {0}")]
    Status(u16),
    /// Response payload could not be decoded as a protobuf message.
    #[error("failed to decode protobuf payload: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The response correlates to a different request; discarded.
    #[error("response request_id does not match the request")]
    RequestIdMismatch,
}

/// Reusable client bound to no particular server address.
#[derive(Debug, Clone)]
pub struct ConfigServerClient {
    client: reqwest::Client,
}

impl ConfigServerClient {
    /// Builds a client whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Sends one heartbeat and returns the server's per-config verdicts.
    pub async fn send_heartbeat(
        &self,
        address: &ConfigServerAddress,
        request: &HeartBeatRequest,
    ) -> Result<Vec<ConfigCheckResult>, HttpError> {
        let body = self
            .post(address, HEARTBEAT_OPERATION, request.encode_to_vec())
            .await?;
        let response = HeartBeatResponse::decode(body.as_slice())?;
        if response.request_id != request.request_id {
            return Err(HttpError::RequestIdMismatch);
        }
        debug!(
            request_id = response.request_id.as_str(),
            code = response.code,
            results = response.pipeline_check_results.len(),
            "heartbeat succeeded"
        );
        Ok(response.pipeline_check_results)
    }

    /// Fetches the bodies of the configs named in `request`.
    pub async fn fetch_pipeline_config(
        &self,
        address: &ConfigServerAddress,
        request: &FetchPipelineConfigRequest,
    ) -> Result<Vec<ConfigDetail>, HttpError> {
        let body = self
            .post(address, FETCH_OPERATION, request.encode_to_vec())
            .await?;
        let response = FetchPipelineConfigResponse::decode(body.as_slice())?;
        if response.request_id != request.request_id {
            return Err(HttpError::RequestIdMismatch);
        }
        debug!(
            request_id = response.request_id.as_str(),
            code = response.code,
            details = response.config_details.len(),
            "config fetch succeeded"
        );
        Ok(response.config_details)
    }

    async fn post(
        &self,
        address: &ConfigServerAddress,
        operation: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!(
            "http://{}:{}{}/{}",
            address.host, address.port, AGENT_ENDPOINT, operation
        );
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, TYPE_PROTOBUF)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configserver_proto::{CheckStatus, ConfigType};
    use httpmock::prelude::*;

    fn address_of(server: &MockServer) -> ConfigServerAddress {
        ConfigServerAddress {
            host: server.host(),
            port: server.port(),
        }
    }

    fn heartbeat_request(request_id: &str) -> HeartBeatRequest {
        HeartBeatRequest {
            request_id: request_id.to_string(),
            agent_id: "agent-1".into(),
            agent_type: "iLogtail".into(),
            interval: 10,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn heartbeat_returns_correlated_check_results() {
        let server = MockServer::start_async().await;
        let response = HeartBeatResponse {
            request_id: "req-1".into(),
            code: 0,
            pipeline_check_results: vec![ConfigCheckResult {
                r#type: ConfigType::PipelineConfig as i32,
                name: "a".into(),
                new_version: 1,
                check_status: CheckStatus::New as i32,
                ..Default::default()
            }],
        };
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/Agent/HeartBeat")
                    .header("content-type", "application/x-protobuf");
                then.status(200).body(response.encode_to_vec());
            })
            .await;

        let client = ConfigServerClient::new(Duration::from_secs(2)).expect("client");
        let results = client
            .send_heartbeat(&address_of(&server), &heartbeat_request("req-1"))
            .await
            .expect("heartbeat");
        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "a");
        assert_eq!(results[0].check_status(), CheckStatus::New);
    }

    #[tokio::test]
    async fn mismatched_request_id_is_discarded() {
        let server = MockServer::start_async().await;
        let response = HeartBeatResponse {
            request_id: "someone-elses-request".into(),
            ..Default::default()
        };
        server
            .mock_async(|when, then| {
                when.method(POST).path("/Agent/HeartBeat");
                then.status(200).body(response.encode_to_vec());
            })
            .await;

        let client = ConfigServerClient::new(Duration::from_secs(2)).expect("client");
        let err = client
            .send_heartbeat(&address_of(&server), &heartbeat_request("req-1"))
            .await
            .expect_err("mismatch must be discarded");
        assert!(matches!(err, HttpError::RequestIdMismatch));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/Agent/FetchPipelineConfig");
                then.status(503);
            })
            .await;

        let client = ConfigServerClient::new(Duration::from_secs(2)).expect("client");
        let request = FetchPipelineConfigRequest {
            request_id: "req-2".into(),
            agent_id: "agent-1".into(),
            req_configs: Vec::new(),
        };
        let err = client
            .fetch_pipeline_config(&address_of(&server), &request)
            .await
            .expect_err("503 must surface");
        assert!(matches!(err, HttpError::Status(503)));
    }

    #[tokio::test]
    async fn garbage_payload_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/Agent/HeartBeat");
                then.status(200).body(vec![0xff, 0xff, 0xff, 0xff]);
            })
            .await;

        let client = ConfigServerClient::new(Duration::from_secs(2)).expect("client");
        let err = client
            .send_heartbeat(&address_of(&server), &heartbeat_request("req-1"))
            .await
            .expect_err("garbage must fail decoding");
        assert!(matches!(err, HttpError::Decode(_)));
    }
}
