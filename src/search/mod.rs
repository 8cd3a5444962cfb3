//! Semantic search over the OpenSearch k-NN index.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌────────────────┐
//! │   Query text    │────▶│    Embedder    │
//! │                 │     │ (Bedrock Titan)│
//! └─────────────────┘     └───────┬────────┘
//!                                 │
//!                                 ▼
//!                         ┌──────────────┐
//!                         │   Embedding  │
//!                         │  [f32; 1536] │
//!                         └──────┬───────┘
//!                                │
//!                                ▼
//!                         ┌──────────────┐
//!                         │ VectorIndex  │
//!                         │ (OpenSearch) │
//!                         └──────┬───────┘
//!                                │  RawHit
//!                                ▼
//!                         ┌──────────────┐      ┌────────────────────┐
//!                         │  formatter   │─────▶│ SearchNotifyFlow   │
//!                         │  SearchHit   │      │ digest + WebSocket │
//!                         └──────────────┘      └────────────────────┘
//! ```

pub mod digest;
mod pipeline;

pub use pipeline::{SearchNotifyFlow, SearchOutcome, SearchPipeline};

/// Default embedding model (Titan text embeddings v1, 1536 dimensions)
pub const DEFAULT_MODEL: &str = "amazon.titan-embed-text-v1";

/// Vector dimension configured in the index mapping
pub const EMBEDDING_DIM: usize = 1536;
