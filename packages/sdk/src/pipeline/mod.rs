// packages/sdk/src/pipeline/mod.rs
//! Event delivery pipeline
//!
//! Everything between admission and the collector:
//!
//! - **Queue**: bounded FIFO shared by capture and delivery
//! - **Sampler**: per-kind Bernoulli admission with overrides
//! - **Flush policy**: debounced (errors) and throttled (routine) triggers
//! - **Sender**: parallel batch POSTs with retry, timeout, compression
//! - **Spill**: persistent park for events that exhausted retries
//! - **Beacon**: one-shot unload-safe delivery
//!
//! ```text
//! capture → sample → Queue → drain → Sender ─ ok ──→ collector
//!                      │                └─ fail ──→ Spill ──(online/startup)──→ Sender
//!                      └──(unload)──→ Beacon
//! ```

pub mod beacon;
pub mod compressor;
pub mod flush;
pub mod queue;
pub mod sampler;
pub mod sender;
pub mod spill;

pub use beacon::{BeaconChannel, BeaconSender, HttpBeaconChannel, MemoryBeaconChannel};
pub use compressor::{CompressionLevel, Compressor};
pub use flush::FlushPolicy;
pub use queue::{EventQueue, QueueStats};
pub use sampler::Sampler;
pub use sender::{
    HttpSender, HttpTransport, SendReport, SenderConfig, Transport, TransportRequest,
    TransportResponse,
};
pub use spill::SpillStore;
