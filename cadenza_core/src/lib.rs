mod action;
mod auth;
mod cache;
mod client;
mod codec;
mod debug;
pub mod error;
mod maintenance;
mod pagination;
pub mod transport;

pub mod prelude {
    pub use crate::action::{Action, ActionHandle, BoxFuture};
    pub use crate::auth::{
        AuthRuntime, Authenticator, FnAuthenticator, HttpAuthenticator, RefreshFuture,
        TokenBundle, TokenResponse, TokenState,
    };
    pub use crate::cache::{Fingerprint, ResponseCache};
    pub use crate::client::ApiClient;
    pub use crate::codec::Json;
    pub use crate::debug::{DebugLevel, DebugSink, NoopDebugSink, StderrDebugSink};
    pub use crate::error::{BoxError, Error, ErrorBody};
    pub use crate::maintenance::{Maintenance, MaintenanceConfig};
    pub use crate::pagination::{
        Caps, CursorPage, CursorWire, Cursors, Decoder, Page, PageFetcher, PageWire,
    };
    pub use crate::transport::{Request, ReqwestTransport, Response, Transport, TransportError};
}
