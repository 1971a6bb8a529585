/// Configuration for a [`WriterSource`](crate::WriterSource).
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the outgoing message queue. `write` fails with
    /// [`WriteError::QueueFull`](crate::WriteError::QueueFull) once this many
    /// messages are pending.
    pub max_messages: usize,
    /// Size of the scratch buffer used for each `read(2)` on the descriptor.
    pub read_buffer_size: usize,
    /// Upper bound on epoll events retrieved per dispatch call.
    pub max_events: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_messages: 1024,
            read_buffer_size: 16384,
            max_events: 64,
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.max_messages == 0 {
            return Err(crate::error::Error::Config(
                "max_messages must be > 0".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(crate::error::Error::Config(
                "read_buffer_size must be > 0".into(),
            ));
        }
        if self.max_events == 0 || self.max_events > i32::MAX as usize {
            return Err(crate::error::Error::Config(
                "max_events must be > 0 and fit in an i32".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`Config`] with `build()` validation.
///
/// # Example
///
/// ```rust
/// use pollwriter::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .max_messages(256)
///     .read_buffer_size(4096)
///     .build()
///     .expect("invalid config");
/// assert_eq!(config.max_messages, 256);
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outgoing queue capacity.
    pub fn max_messages(mut self, n: usize) -> Self {
        self.config.max_messages = n;
        self
    }

    /// Set the read scratch-buffer size in bytes.
    pub fn read_buffer_size(mut self, n: usize) -> Self {
        self.config.read_buffer_size = n;
        self
    }

    /// Set the maximum number of epoll events handled per dispatch call.
    pub fn max_events(mut self, n: usize) -> Self {
        self.config.max_events = n;
        self
    }

    /// Validate and build the final [`Config`].
    pub fn build(self) -> Result<Config, crate::error::Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_values_rejected() {
        let cases = [
            ConfigBuilder::new().max_messages(0),
            ConfigBuilder::new().read_buffer_size(0),
            ConfigBuilder::new().max_events(0),
        ];
        for builder in cases {
            assert!(matches!(builder.build(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn builder_sets_fields() {
        let config = ConfigBuilder::new()
            .max_messages(2)
            .read_buffer_size(4096)
            .max_events(8)
            .build()
            .unwrap();
        assert_eq!(config.max_messages, 2);
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.max_events, 8);
    }
}
