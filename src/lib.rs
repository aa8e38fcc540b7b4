pub mod archive;
pub mod codec;
pub mod container;
pub mod crypto;
pub mod error;
pub mod tree;

pub use archive::{create_container, extract_container, list_container, PackOptions};
pub use codec::CodecId;
pub use container::{Container, ContainerHeader, MAGIC};
pub use crypto::{DerivedKey, Passphrase};
pub use error::{Error, FormatError, Result};
pub use tree::{EntryInfo, EntryKind};
