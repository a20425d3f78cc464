pub mod error;
pub mod key_id;
pub mod request_state;
pub mod retry;
pub mod stream;
pub mod types;

pub use error::CoreError;
pub use key_id::{AssetId, ContentKeyId};
pub use request_state::KeyRequestState;
pub use retry::RetryReason;
pub use stream::{Environment, StreamDescriptor};
pub use types::{PlaylistUrl, SessionToken, StreamName};
