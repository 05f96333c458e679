mod in_memory;
mod qdrant;
mod supabase;

pub use in_memory::InMemoryMemoryStore;
pub use qdrant::QdrantMemoryStore;
pub use supabase::SupabaseMemoryStore;
