//! Rolling p99 scheduling latency for a tokio runtime.
//!
//! A [`source::MetricSource`] hands out cumulative latency histograms; the
//! [`sampler::Sampler`] keeps a sliding window of them, diffs the newest
//! against the oldest, and publishes the p99 of that interval to every
//! callback in a [`callbacks::CallbackRegistry`].

pub mod callbacks;
pub mod config;
pub mod histogram;
pub mod logging;
pub mod observer;
pub mod sampler;
pub mod settings;
pub mod source;
pub mod window;

pub use callbacks::{CallbackId, CallbackRegistry};
pub use histogram::Histogram;
pub use sampler::{Phase, Sampler, SamplerHandle, SamplerStatus};
pub use settings::{SamplerConfig, Settings, SettingsError};
pub use source::{MetricSource, RuntimeProbe};
pub use window::SlidingWindow;
