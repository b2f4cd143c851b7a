pub mod approval_log;
pub mod leave_request;
pub mod role;
