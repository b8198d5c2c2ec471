pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod reply;
pub mod sessions;
pub mod storage;

pub use config::WorkpulseConfig;
pub use error::WorkpulseError;
pub use inference::{InferenceBackend, InferenceError, OpenAiChatClient};
pub use models::{AnalysisResult, ImageUpload, NewSession, SessionMeta};
pub use reply::{parse_reply, ParsedReply, ReplyError};
pub use sessions::{PersistError, SessionStore, SupabaseSessionStore};
pub use storage::{ObjectStore, StorageError, SupabaseStorageClient};
