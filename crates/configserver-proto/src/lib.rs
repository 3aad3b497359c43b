//! Protobuf models for the fleet config-server agent protocol.
//!
//! The config server speaks protobuf over HTTP POST: agents send
//! `HeartBeatRequest` to `/Agent/HeartBeat` and `FetchPipelineConfigRequest`
//! to `/Agent/FetchPipelineConfig`, both with
//! `Content-Type: application/x-protobuf`. The message structs are generated
//! with `prost-build` from `proto/configserver/agent.proto` and committed
//! here so building the workspace does not require `protoc`.

pub mod configserver;

pub use configserver::{
    AgentAttributes, CheckStatus, ConfigCheckResult, ConfigDetail, ConfigInfo, ConfigType,
    FetchPipelineConfigRequest, FetchPipelineConfigResponse, HeartBeatRequest, HeartBeatResponse,
};
