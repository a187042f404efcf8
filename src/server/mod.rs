pub mod api;

use crate::assistant::ChatService;
use crate::cli::Args;
use self::api::{ AppState, TlsPaths };
use log::{ error, info };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct Server {
    addr: String,
    chat: Arc<ChatService>,
    args: Args,
}

impl Server {
    pub fn new(
        addr: String,
        chat: Arc<ChatService>,
        args: Args,
    ) -> Self {
        Self {
            addr,
            chat,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr: SocketAddr = self.addr
            .parse()
            .map_err(|e| format!("Invalid server address '{}': {}", self.addr, e))?;
        let app = api::router(AppState { chat: self.chat.clone() });
        api::start_http_server(addr, app, self.tls_paths()?).await
    }

    fn tls_paths(&self) -> Result<Option<TlsPaths>, Box<dyn Error + Send + Sync>> {
        if !self.args.enable_tls {
            info!("TLS not enabled. Serving plain HTTP.");
            return Ok(None);
        }
        match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                Ok(Some(TlsPaths {
                    cert_path: cert_path.clone(),
                    key_path: key_path.clone(),
                }))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                Err("Missing TLS certificate or key path".into())
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                Err("TLS enabled without cert/key".into())
            }
        }
    }
}
