pub mod result;
pub mod task;
pub mod types;

pub use result::ClassificationResult;
pub use task::TaskState;
pub use types::{
    BatchRequest, BatchResponse, ProcessEmailsChunk, ProcessEmailsRequest, ResultPage,
    ResultQuery, TaskStatusResponse,
};
