#[cfg(feature = "redpanda")]
pub mod redpanda;

#[cfg(feature = "redpanda")]
pub use redpanda::RedpandaNotificationSink;
