use std::time::Duration;

/// Tunables for a [`crate::router::SessionRouter`]. Constructed via the
/// builder below, following the teacher's `CodexClientBuilder` convention of
/// explicit setters returning `Self` over a struct-literal-with-`..Default`.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub channel_capacity: usize,
    pub reverse_request_floor: i64,
    pub backend_request_floor: i64,
    pub backend_startup_timeout: Duration,
    pub mirror_backend_stderr: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            channel_capacity: 64,
            reverse_request_floor: crate::message::SeqAllocator::REVERSE_REQUEST_FLOOR,
            backend_request_floor: crate::message::SeqAllocator::BACKEND_REQUEST_FLOOR,
            backend_startup_timeout: Duration::from_secs(10),
            mirror_backend_stderr: true,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct SessionConfigBuilder {
    inner: SessionConfigOverrides,
}

#[derive(Default)]
struct SessionConfigOverrides {
    channel_capacity: Option<usize>,
    reverse_request_floor: Option<i64>,
    backend_request_floor: Option<i64>,
    backend_startup_timeout: Option<Duration>,
    mirror_backend_stderr: Option<bool>,
}

impl SessionConfigBuilder {
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.inner.channel_capacity = Some(capacity);
        self
    }

    pub fn reverse_request_floor(mut self, floor: i64) -> Self {
        self.inner.reverse_request_floor = Some(floor);
        self
    }

    pub fn backend_request_floor(mut self, floor: i64) -> Self {
        self.inner.backend_request_floor = Some(floor);
        self
    }

    pub fn backend_startup_timeout(mut self, timeout: Duration) -> Self {
        self.inner.backend_startup_timeout = Some(timeout);
        self
    }

    pub fn mirror_backend_stderr(mut self, mirror: bool) -> Self {
        self.inner.mirror_backend_stderr = Some(mirror);
        self
    }

    pub fn build(self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            channel_capacity: self.inner.channel_capacity.unwrap_or(defaults.channel_capacity),
            reverse_request_floor: self
                .inner
                .reverse_request_floor
                .unwrap_or(defaults.reverse_request_floor),
            backend_request_floor: self
                .inner
                .backend_request_floor
                .unwrap_or(defaults.backend_request_floor),
            backend_startup_timeout: self
                .inner
                .backend_startup_timeout
                .unwrap_or(defaults.backend_startup_timeout),
            mirror_backend_stderr: self
                .inner
                .mirror_backend_stderr
                .unwrap_or(defaults.mirror_backend_stderr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_seq_floors() {
        let config = SessionConfig::default();
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.reverse_request_floor, 1_000_000);
        assert_eq!(config.backend_request_floor, 2_000_000);
    }

    #[test]
    fn builder_overrides_only_the_fields_touched() {
        let config = SessionConfig::builder().channel_capacity(8).build();
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.backend_request_floor, 2_000_000);
    }
}
