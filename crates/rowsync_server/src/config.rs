//! Server configuration.

use rowsync_protocol::ConflictResolution;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the bulk sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// How long an idle bulk session is kept.
    pub session_ttl: Duration,
    /// How often expired sessions are purged.
    pub purge_interval: Duration,
    /// Largest chunk served or accepted.
    pub max_chunk_size: usize,
    /// How conflicting uploaded items are settled.
    pub conflict_resolution: ConflictResolution,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            session_ttl: Duration::from_secs(600),
            purge_interval: Duration::from_secs(60),
            max_chunk_size: 1000,
            conflict_resolution: ConflictResolution::Skip,
        }
    }

    /// Sets the session time-to-live.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sets the purge interval.
    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Sets the maximum chunk size.
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size.max(1);
        self
    }

    /// Sets the conflict resolution applied to uploads.
    pub fn with_conflict_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = resolution;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.session_ttl, Duration::from_secs(600));
        assert_eq!(config.max_chunk_size, 1000);
        assert_eq!(config.conflict_resolution, ConflictResolution::Skip);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_session_ttl(Duration::from_secs(5))
            .with_max_chunk_size(0)
            .with_conflict_resolution(ConflictResolution::ForceWrite);

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.session_ttl, Duration::from_secs(5));
        assert_eq!(config.max_chunk_size, 1);
        assert_eq!(config.conflict_resolution, ConflictResolution::ForceWrite);
    }
}
