pub mod event;
pub mod req;
