pub mod signature;
pub mod webhook_payload;
