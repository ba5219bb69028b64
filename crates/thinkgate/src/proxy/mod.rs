mod error;
mod passthrough;
mod request;
mod server;
mod streaming;

pub use error::ProxyError;
pub use passthrough::{
    HOP_BY_HOP_HEADERS, build_response, forward_headers, relay_headers, relay_response,
    send_upstream,
};
pub use request::InferenceRequest;
pub use server::{AppState, ProxyServer, create_router};
pub use streaming::{NdjsonTransformer, transform_stream};
