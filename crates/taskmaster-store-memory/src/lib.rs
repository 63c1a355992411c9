//! In-process backends for taskmaster: a document collection with live
//! queries and an identity provider with an observable session.

pub mod documents;
pub mod error;
pub mod identity;

pub use documents::{ConditionalWrite, DEFAULT_COLLECTION, Listener, MemoryDocumentStore, QueryEvent, Registration};
pub use error::{AuthError, StoreError};
pub use identity::{DEFAULT_MIN_PASSWORD_LEN, MemoryIdentityProvider};
