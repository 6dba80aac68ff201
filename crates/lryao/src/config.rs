//! Protocol configuration.

use derive_builder::Builder;

/// Configuration shared by the protocol drivers.
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ProtocolConfig {
    /// Number of worker threads used for local computation.
    #[builder(default = "1")]
    threads: usize,
    /// Number of IO channels expected by the drivers, one per worker.
    #[builder(default = "1")]
    channels: usize,
}

impl ProtocolConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.channels == Some(0) {
            return Err("at least one channel is required".to_string());
        }

        Ok(())
    }
}

impl ProtocolConfig {
    /// Creates a new builder for the configuration.
    pub fn builder() -> ProtocolConfigBuilder {
        ProtocolConfigBuilder::default()
    }

    /// Returns the number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Returns the number of IO channels.
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            channels: 1,
        }
    }
}
