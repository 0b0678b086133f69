//! WhatsApp conversation core for leave applications
//!
//! - **Lookup** (`lookup`) - sender id to employee record via the trailing-digit key
//! - **State** (`state`) - per-sender conversation store with serialized access
//! - **Router** (`router`) - classifies each inbound event and drives the leave flow
//! - **Replies** (`replies`) - outbound text and reply-button menus
//! - **Gateway** (`gateway`) - the `send` side of the messaging provider
//! - **Events** (`events`) - the `receive` side, pumping events into the router
//!
//! # Architecture
//!
//! ```text
//! EventSource → EventPump → IntentRouter → ConversationStore / EmployeeLookup
//!                                ↓
//!              MessagingGateway ← Replies
//! ```

pub mod events;
pub mod gateway;
pub mod locks;
pub mod lookup;
pub mod replies;
pub mod router;
pub mod state;

pub use events::{
    ChannelEventSource, Delivery, EventContext, EventPump, EventSource, PumpStats, SourceError,
};
pub use gateway::{DeliveryReceipt, GatewayError, MessagingGateway, RecordingGateway};
pub use lookup::{EmployeeLookup, LookupError};
pub use router::{HandlerResult, IntentRouter, RouteError, RouterSettings};
pub use state::ConversationStore;
