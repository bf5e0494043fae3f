//! HTTP API handlers for replay-vc

pub mod health;
pub mod jobs;
pub mod sse;
pub mod stemming;

pub use health::health_routes;
pub use jobs::job_routes;
pub use sse::event_stream;
pub use stemming::stemming_routes;
