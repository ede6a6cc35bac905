//! Pipeline configuration.
//!
//! A [`PipelineConfig`] describes one use-case instance: its identity, the
//! admitted request-queue depth, batching and the bounded-wait timeouts used
//! by stream-on and flush.

use campipe_errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request-queue depth.
pub const DEFAULT_REQUEST_QUEUE_DEPTH: u32 = 8;

/// Default frame rate used when deriving pipeline delay.
pub const DEFAULT_FPS: u32 = 30;

/// Default static maximum pipeline delay, in frames.
pub const DEFAULT_MAX_PIPELINE_DELAY: u32 = 3;

/// Configuration for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name (e.g. `"Preview"`).
    pub name: String,
    /// Numeric pipeline id within the session.
    pub pipeline_id: u32,
    /// Camera id the pipeline captures from.
    pub camera_id: u32,
    /// Index used to key session records.
    pub pipeline_index: u32,
    /// Realtime pipelines link hardware and wait for config-done on stream-on.
    pub realtime: bool,
    /// Admitted request-queue depth before frame delay.
    pub default_request_queue_depth: u32,
    /// Upper bound on the admitted depth. The slot ring holds twice this many.
    pub max_request_queue_depth: u32,
    /// Frames per request in batch mode.
    pub max_batched_frames: u32,
    /// Nominal frame rate.
    pub default_fps: u32,
    /// Frame rate of the use case.
    pub usecase_fps: u32,
    /// Pipeline delay before frame-rate adjustment.
    pub static_max_pipeline_delay: u32,
    /// Extra frames of sensor delay published by the use case.
    pub frame_delay: u32,
    /// Extra buffers the framework must provision.
    pub extra_framework_buffers: u32,
    /// Bound on the stream-on config-done wait.
    pub stream_on_timeout: Duration,
    /// Bound on the wait for every node to finish outstanding requests.
    pub all_nodes_done_timeout: Duration,
    /// Deliver partial metadata to the session.
    pub partial_metadata_enabled: bool,
    /// Let the invalid-SOF watchdog escalate recovery.
    pub watchdog_recovery_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "Pipeline".to_string(),
            pipeline_id: 0,
            camera_id: 0,
            pipeline_index: 0,
            realtime: true,
            default_request_queue_depth: DEFAULT_REQUEST_QUEUE_DEPTH,
            max_request_queue_depth: DEFAULT_REQUEST_QUEUE_DEPTH,
            max_batched_frames: 1,
            default_fps: DEFAULT_FPS,
            usecase_fps: DEFAULT_FPS,
            static_max_pipeline_delay: DEFAULT_MAX_PIPELINE_DELAY,
            frame_delay: 0,
            extra_framework_buffers: 0,
            stream_on_timeout: Duration::from_millis(700),
            all_nodes_done_timeout: Duration::from_millis(300),
            partial_metadata_enabled: true,
            watchdog_recovery_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty name, zero depths, a default
    /// depth above the maximum, a zero batch size, zero frame rates or zero
    /// timeouts.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName.into());
        }
        if self.default_request_queue_depth == 0 {
            return Err(ConfigError::zero("default_request_queue_depth").into());
        }
        if self.max_request_queue_depth == 0 {
            return Err(ConfigError::zero("max_request_queue_depth").into());
        }
        if self.default_request_queue_depth > self.max_request_queue_depth {
            return Err(ConfigError::DepthAboveMax {
                default: self.default_request_queue_depth,
                max: self.max_request_queue_depth,
            }
            .into());
        }
        if self.max_batched_frames == 0 {
            return Err(ConfigError::zero("max_batched_frames").into());
        }
        if self.default_fps == 0 {
            return Err(ConfigError::zero("default_fps").into());
        }
        if self.usecase_fps == 0 {
            return Err(ConfigError::zero("usecase_fps").into());
        }
        if self.stream_on_timeout.is_zero() {
            return Err(ConfigError::zero("stream_on_timeout").into());
        }
        if self.all_nodes_done_timeout.is_zero() {
            return Err(ConfigError::zero("all_nodes_done_timeout").into());
        }
        Ok(())
    }

    /// Identity string used in every log line: `{name}_{pipeline_id}_cam_{camera_id}`.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}_{}_cam_{}", self.name, self.pipeline_id, self.camera_id)
    }

    /// Admitted request-queue depth: default plus frame delay, capped at max.
    #[must_use]
    pub fn request_queue_depth(&self) -> u32 {
        let wanted = self.default_request_queue_depth.saturating_add(self.frame_delay);
        if wanted > self.max_request_queue_depth {
            tracing::warn!(
                pipeline = %self.identity(),
                wanted,
                max = self.max_request_queue_depth,
                "Request queue depth capped at maximum"
            );
            return self.max_request_queue_depth;
        }
        wanted
    }

    /// Number of slots in the per-request ring.
    #[must_use]
    pub fn ring_capacity(&self) -> usize {
        (self.max_request_queue_depth as usize).saturating_mul(2)
    }

    /// Maximum pipeline delay, one frame longer for high frame-rate use cases.
    #[must_use]
    pub fn max_pipeline_delay(&self) -> u32 {
        if self.usecase_fps > self.default_fps {
            self.static_max_pipeline_delay.saturating_add(1)
        } else {
            self.static_max_pipeline_delay
        }
    }

    /// Frames a result's metadata buffer stays referenced after the request.
    ///
    /// Realtime pipelines hold it for the longer of the pipeline delay and the
    /// frame delay; offline pipelines release it immediately.
    #[must_use]
    pub fn meta_buffer_delay(&self) -> u32 {
        if self.realtime {
            self.max_pipeline_delay().max(self.frame_delay)
        } else {
            0
        }
    }

    /// Interval between frames of one batched request, in nanoseconds.
    ///
    /// Zero when batching is off.
    #[must_use]
    pub fn batch_frame_interval_ns(&self) -> u64 {
        if self.max_batched_frames > 1 {
            1_000_000_000 / u64::from(self.usecase_fps.max(1))
        } else {
            0
        }
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the pipeline name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the pipeline id.
    #[must_use]
    pub fn pipeline_id(mut self, id: u32) -> Self {
        self.config.pipeline_id = id;
        self
    }

    /// Set the camera id.
    #[must_use]
    pub fn camera_id(mut self, id: u32) -> Self {
        self.config.camera_id = id;
        self
    }

    /// Set the index used to key session records.
    #[must_use]
    pub fn pipeline_index(mut self, index: u32) -> Self {
        self.config.pipeline_index = index;
        self
    }

    /// Mark the pipeline realtime or offline.
    #[must_use]
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.config.realtime = realtime;
        self
    }

    /// Set default and maximum request-queue depth to the same value.
    #[must_use]
    pub fn request_queue_depth(mut self, depth: u32) -> Self {
        self.config.default_request_queue_depth = depth;
        self.config.max_request_queue_depth = depth;
        self
    }

    /// Set the maximum request-queue depth.
    #[must_use]
    pub fn max_request_queue_depth(mut self, depth: u32) -> Self {
        self.config.max_request_queue_depth = depth;
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn max_batched_frames(mut self, frames: u32) -> Self {
        self.config.max_batched_frames = frames;
        self
    }

    /// Set the use-case frame rate.
    #[must_use]
    pub fn usecase_fps(mut self, fps: u32) -> Self {
        self.config.usecase_fps = fps;
        self
    }

    /// Set the published frame delay.
    #[must_use]
    pub fn frame_delay(mut self, frames: u32) -> Self {
        self.config.frame_delay = frames;
        self
    }

    /// Set the extra framework buffer count.
    #[must_use]
    pub fn extra_framework_buffers(mut self, count: u32) -> Self {
        self.config.extra_framework_buffers = count;
        self
    }

    /// Set the stream-on config-done timeout.
    #[must_use]
    pub fn stream_on_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_on_timeout = timeout;
        self
    }

    /// Set the all-nodes-done timeout.
    #[must_use]
    pub fn all_nodes_done_timeout(mut self, timeout: Duration) -> Self {
        self.config.all_nodes_done_timeout = timeout;
        self
    }

    /// Enable or disable partial metadata delivery.
    #[must_use]
    pub fn partial_metadata_enabled(mut self, enabled: bool) -> Self {
        self.config.partial_metadata_enabled = enabled;
        self
    }

    /// Enable or disable watchdog recovery.
    #[must_use]
    pub fn watchdog_recovery_enabled(mut self, enabled: bool) -> Self {
        self.config.watchdog_recovery_enabled = enabled;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
