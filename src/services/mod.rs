//! Service layer exposed to the outer application.

mod message_service;

pub use message_service::{
    DeliveryStats, MessageDetails, MessageService, SubmitReceipt, SubmitRequest,
};
