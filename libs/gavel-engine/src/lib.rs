pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod judge0;
pub mod poller;
pub mod sink;
pub mod submission;


pub use dispatcher::Dispatcher;
pub use error::{JudgeError, SinkError, ValidationError};
pub use evaluator::aggregate;
pub use executor::{
    AcceptReport, DispatchMode, Rejection, ValidationOptions, ValidationOutcome,
    ValidationPolicy, Validator,
};
pub use judge0::{Judge0Client, JudgeApi, SubmissionRequest};
pub use poller::Poller;
pub use sink::{CandidateSink, JsonDirSink};
pub use submission::{build, Submission, SubmissionStatus};
