//! Storage for UniDesk: session stores, vector stores, embedders and the
//! course-scoped retriever built on top of them.

pub mod embedder;
pub mod in_memory;
pub mod qdrant;
pub mod retriever;
pub mod sqlite;
pub mod vector;

pub use embedder::{HashEmbedder, ProviderEmbedder};
pub use in_memory::InMemorySessionStore;
pub use qdrant::QdrantStore;
pub use retriever::Retriever;
pub use sqlite::SqliteSessionStore;
pub use vector::{InMemoryVectorStore, cosine_distance, cosine_similarity};
