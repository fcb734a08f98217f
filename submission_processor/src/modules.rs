pub mod audit;
pub mod error;
pub mod notification;
pub mod object_store;
pub mod pipeline;
pub mod remote_fetch;
pub mod submission_event;
pub mod submission_worker;

#[cfg(test)]
pub mod testing;
