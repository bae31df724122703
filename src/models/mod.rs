mod delivery;
mod integration;
mod message;

pub use delivery::{
    DeliveryContext, DeliveryFilter, DeliveryPatch, DeliveryStatus, DispatchTarget,
    IntegrationDeliveryCount, MessageDelivery, NewDelivery, RetryUpdate, ScheduledJob,
};
pub use integration::{
    EvolutionConfig, Integration, IntegrationStatus, PlatformKind, SelectedConversation,
    TelegramConfig,
};
pub use message::{Message, MessageCounts, NewMessage};
