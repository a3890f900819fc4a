//! Viewgate HTTP server.
//!
//! # Running
//!
//! ```bash
//! export VIEWGATE_BIND_ADDR=0.0.0.0:8080
//! export VIEWGATE_DATA_PATH=/var/lib/viewgate/viewgate.json
//! export VIEWGATE_ADMIN_API_KEY=change-me
//! viewgate-server
//! ```
//!
//! Every threshold has a `VIEWGATE_*` override; see `ServerConfig::from_env`.

use viewgate::{logging, server, ServerConfig, ViewgateError};

#[tokio::main]
async fn main() {
    logging::init("info,viewgate=info");

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::serve(config).await {
        match &e {
            ViewgateError::Server(_) => eprintln!("Server failed: {}", e),
            ViewgateError::StoreIO(_) | ViewgateError::ProtocolError(_) => {
                eprintln!("Could not open the data store: {}", e)
            }
            _ => eprintln!("Startup error: {}", e),
        }
        std::process::exit(1);
    }
}
