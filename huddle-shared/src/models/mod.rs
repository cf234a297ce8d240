pub mod errors;
pub mod events;
pub mod message;
pub mod scope;
pub mod timestamp;

pub use errors::ErrorResponse;
pub use events::MessageEvent;
pub use message::{
    CreateMessageRequest, DELETED_MESSAGE_CONTENT, EditMessageRequest, MESSAGES_BATCH,
    MemberRole, MemberView, MessagePage, MessageView, ProfileView,
};
pub use scope::{ChatKey, ScopeKind, TopicKind};
pub use timestamp::Timestamp;
