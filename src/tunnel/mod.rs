//! Tunnel endpoints
//!
//! The client endpoint accepts miners locally and tunnels each connection
//! over an authenticated WebSocket; the server endpoint accepts those
//! WebSockets, dials the pool and hides behind decoy web backends.

pub mod auth;
mod client;
pub mod decoy;
mod server;

pub use client::ClientEndpoint;
pub use decoy::DecoyProxy;
pub use server::ServerEndpoint;

use uuid::Uuid;

/// Short random id tagging the log lines of one session
pub(crate) fn session_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id() {
        let a = session_id();
        let b = session_id();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
