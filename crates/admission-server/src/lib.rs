pub mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod tracing;

use std::{net::SocketAddr, sync::Arc};

use ::tracing::info;
use admission_policy::PolicyEvaluator;
use anyhow::Result;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;

use crate::api::{admission_review::ReviewDecoder, state::ApiServerState};
use crate::certs::create_tls_config_and_watch_certificate_changes;
use crate::config::Config;

pub struct AdmissionServer {
    router: Router,
    addr: SocketAddr,
    tls_config: Option<RustlsConfig>,
}

impl AdmissionServer {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let state = Arc::new(ApiServerState {
            decoder: ReviewDecoder::default(),
            evaluator: PolicyEvaluator::new(config.policy),
        });

        let tls_config = match config.tls_config {
            Some(tls_config) => {
                Some(create_tls_config_and_watch_certificate_changes(tls_config).await?)
            }
            None => None,
        };

        Ok(Self {
            router: api::router(state),
            addr: config.addr,
            tls_config,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<()> {
        match self.tls_config {
            Some(tls_config) => {
                info!(address = %self.addr, "started HTTPS server");
                axum_server::bind_rustls(self.addr, tls_config)
                    .serve(self.router.into_make_service())
                    .await?;
            }
            None => {
                info!(address = %self.addr, "started HTTP server");
                axum_server::bind(self.addr)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        Ok(())
    }
}
