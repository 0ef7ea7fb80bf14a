//! photoframe: Google Photos Picker kiosk slideshow server.
//!
//! The binary in `main.rs` wires these modules together; integration tests in
//! `tests/` drive the same router against mocked Google endpoints.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod oauth;
pub mod picker;
pub mod slideshow;
pub mod store;
pub mod upstream;

use oauth::OAuthClient;
use picker::{PickFlows, PickerClient};
use store::{SelectionStore, TokenStore};
use upstream::UpstreamClient;

/// Shared application state passed to handlers and background jobs.
pub struct AppState {
    pub config: config::Config,
    pub oauth: Arc<OAuthClient>,
    pub tokens: Arc<TokenStore>,
    pub selection: Arc<SelectionStore>,
    pub flows: Arc<PickFlows>,
}

impl AppState {
    pub fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let oauth = Arc::new(OAuthClient::new(config.oauth.clone(), upstream.clone()));
        let tokens = Arc::new(TokenStore::new(
            config.tokens_path.clone(),
            oauth.clone(),
            config.token_refresh_margin,
        ));
        let selection = Arc::new(SelectionStore::new(config.selection_path.clone()));
        let picker = Arc::new(PickerClient::new(
            config.picker_api_base.clone(),
            upstream,
            tokens.clone(),
            config.poll_interval_override,
        ));
        let flows = Arc::new(PickFlows::new(
            picker,
            selection.clone(),
            config.pick_flow_timeout,
        ));

        Ok(Arc::new(AppState {
            config,
            oauth,
            tokens,
            selection,
            flows,
        }))
    }
}
