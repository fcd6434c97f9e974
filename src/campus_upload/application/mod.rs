pub mod attachment_slot;
pub mod error;
pub mod upload_service;
