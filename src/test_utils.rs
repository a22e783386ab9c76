//! Test fixtures: an in-memory server with sane secrets and generous limits.

use crate::config::Config;
use crate::server::Server;

pub const TEST_ADMIN_KEY: &str = "test-admin-key";
pub const TEST_INGEST_KEY: &str = "test-ingest-key";
pub const TEST_MASTER_KEY: &str = "test-master-key";

pub struct TestServerBuilder {
    config: Config,
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServerBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.database.url = "sqlite::memory:".to_string();
        config.auth.api_key = TEST_ADMIN_KEY.to_string();
        config.ingest.key = TEST_INGEST_KEY.to_string();
        config.ingest.rpm = 6000;
        config.ingest.burst = 1000;
        config.encryption.master_key = TEST_MASTER_KEY.to_string();
        config.rate_limit.rpm = 6000;
        config.rate_limit.burst = 1000;
        Self { config }
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_admin_key(self, key: &str) -> Self {
        let key = key.to_string();
        self.with_config(|c| c.auth.api_key = key)
    }

    pub fn with_ingest_key(self, key: &str) -> Self {
        let key = key.to_string();
        self.with_config(|c| c.ingest.key = key)
    }

    pub fn with_ingest_limits(self, rpm: u32, burst: u32) -> Self {
        self.with_config(|c| {
            c.ingest.rpm = rpm;
            c.ingest.burst = burst;
        })
    }

    pub async fn build(self) -> Server {
        let server = Server::new(self.config)
            .await
            .expect("test server setup failed");
        server
            .database
            .migrate()
            .await
            .expect("test migrations failed");
        server
    }
}
