//! Remote configuration plane of the collection agent.
//!
//! The provider keeps the set of pipeline YAML files under the
//! continuous-pipeline directory converged with the config server's declared
//! state. A single worker task heartbeats the server on a fixed cadence,
//! fetches the bodies of new or modified configs, and applies the batch with
//! atomic-rename file writes. Network failures abort the cycle and rotate to
//! a different server; only an unusable pipeline directory disables the
//! provider permanently.

pub mod address;
pub mod http;
pub mod provider;

pub use address::{AddressBook, ConfigServerAddress};
pub use http::{ConfigServerClient, HttpError};
pub use provider::{
    AgentIdentity, ProviderConfig, ProviderError, RemoteConfigProvider,
    CONFIG_KEY_ADDRESSES, CONFIG_KEY_TAGS, CONFIG_KEY_UPDATE_INTERVAL,
    DEFAULT_CONFIG_UPDATE_INTERVAL,
};
