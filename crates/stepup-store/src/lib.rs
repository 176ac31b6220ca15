mod file_store;
mod lock;
mod option_blob;
mod state_file;

pub use file_store::FileVersionStore;
pub use lock::RunLock;
pub use option_blob::{KeyValueBackend, MemoryKeyValue, OptionBlobStore, DEFAULT_OPTION_KEY};

pub(crate) use state_file::{parse_version_state_file, validate_members, VersionStateFile};
