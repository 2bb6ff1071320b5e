//! Repository association.
//!
//! ```text
//!   Entry ──vcs──► RepositoryHandle ──state──► Arc<RootState> ◄── every handle under the root
//!                        │                          │
//!                        └── root_id: EntryId       └── RwLock<Arc<RootSnapshot>>
//! ```

mod handle;
/// Root lookup by marker directory.
pub mod resolve;

pub use handle::{RepositoryHandle, RootSnapshot, RootState};
pub use resolve::{Resolution, resolve};
