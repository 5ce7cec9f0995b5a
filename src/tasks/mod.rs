pub mod batch;
pub mod bulk;
pub mod fetcher;
pub mod poller;
