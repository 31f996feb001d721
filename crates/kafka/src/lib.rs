//! Produce and consume loops for `topic-cli`.
//!
//! - [`producer`] - reads newline-delimited records from an async reader,
//!   serializes key and value, and sends them one at a time
//! - [`consumer`] - polls a subscription and writes one rendered line per
//!   record
//! - [`offsets`] and [`context`] - decide where each assigned partition
//!   starts reading
//!
//! Both loops talk to the broker through a small trait ([`RecordSink`],
//! [`RecordSource`]) so they can be driven without a cluster in tests.

pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod offsets;
pub mod producer;
pub mod render;
pub mod shutdown;

pub use config::{load_properties_file, parse_config_flags, ClientSettings};
pub use consumer::{
    ephemeral_group_id, run_consume_loop, ConsumeSummary, InboundRecord, KafkaRecordSource,
    RecordSource,
};
pub use context::AssignmentContext;
pub use error::{Error, Result};
pub use offsets::{resolve_start_policy, OffsetFlags, OffsetMode, RebalanceInstruction, StartPolicy};
pub use producer::{
    run_produce_loop, KafkaRecordSink, OutboundRecord, ProduceOptions, ProduceSummary, RecordSink,
};
pub use render::ConsumerProperties;
pub use shutdown::setup_shutdown_handler;
