pub mod ids;
pub mod ctx;
pub mod message;
pub mod dead_letter;
pub mod events;

pub use ids::{MessageId, SubscriptionId};
pub use ctx::HandlerCtx;
pub use message::{EnvelopeHeader, Message};
pub use dead_letter::DeadLetter;
pub use events::QueueEvent;
