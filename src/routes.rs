use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{info_span, Instrument};

use crate::config::{AddressingMode, ConfigError, ProxyConfig};
use crate::dns_resolver::{DnsResolver, SystemDnsResolver};
use crate::error::RejectionError;
use crate::identity::{HeaderIdentity, IdentityProvider};
use crate::render::{PlainTextRenderer, ResearchRenderer};
use crate::research::{LookupRequest, ResearchService};

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Default, Deserialize)]
pub struct ResearchParams {
    pub symbol: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
}

impl ResearchParams {
    /// `None` when the parameters needed by `mode` are missing.
    pub fn into_request(self, mode: AddressingMode) -> Option<LookupRequest> {
        let request = LookupRequest {
            symbol: self.symbol?,
            source_key: self.source,
            raw_url: self.url,
        };
        request.address(mode)?;
        Some(request)
    }
}

pub struct AppState {
    pub service: ResearchService,
    pub identity: Box<dyn IdentityProvider>,
    pub renderer: Box<dyn ResearchRenderer>,
}

impl AppState {
    pub fn from_config(config: &ProxyConfig) -> Result<Arc<Self>, ConfigError> {
        let resolver: Arc<dyn DnsResolver> = Arc::new(SystemDnsResolver::new(config.dns_timeout()));
        Ok(Arc::new(Self {
            service: ResearchService::from_config(config, resolver)?,
            identity: Box::new(HeaderIdentity::new(&config.identity_header)?),
            renderer: Box::new(PlainTextRenderer),
        }))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/research", get(research_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

pub async fn research_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<ResearchParams>, QueryRejection>,
) -> Response {
    let Some(user) = state.identity.authenticated_user(&headers) else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let err = RejectionError::Unclassified(rejection.body_text());
            return state.renderer.rejection(&err);
        }
    };

    let mode = state.service.mode();
    let Some(request) = params.into_request(mode) else {
        return state.renderer.form(mode);
    };

    // Dropping this future (client gone) drops the in-flight upstream request.
    let outcome = state
        .service
        .lookup(&request)
        .instrument(info_span!("research", user = %user))
        .await;

    match outcome {
        Ok(text) => state.renderer.result(text),
        Err(err) => state.renderer.rejection(&err),
    }
}

pub async fn health_handler() -> &'static str {
    "ok"
}
