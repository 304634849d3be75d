//! # parlor-server
//!
//! HTTP and WebSocket wiring around the Parlor hub.
//!
//! - `GET /ws?username=&user_id=&token=` - WebSocket endpoint (path configurable)
//! - `GET /rooms`, `POST /rooms` - room administration
//! - `GET /api/presence?user_ids=a,b` - presence lookup
//! - `GET /api/authenticate`, `POST /api/login` - auth collaborator proxies
//! - `GET /health` - liveness

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{router, run_server, serve, AppState};
