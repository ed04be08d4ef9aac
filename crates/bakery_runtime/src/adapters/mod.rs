pub mod dispatch;
pub mod object_store;
