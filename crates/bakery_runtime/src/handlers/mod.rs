pub mod batch;
pub mod parent;
