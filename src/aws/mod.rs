pub mod backend;
pub mod client;

pub use backend::{AwsCliBackend, BackendError, ServiceBackend, ServiceCall};
pub use client::{ClientError, CloudClient, Credentials};
