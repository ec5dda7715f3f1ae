// Library root
// ------------
// Typed client for the Maestro subscription API plus the small terminal
// front-end the binary (`main.rs`) drives.
//
// Module responsibilities:
// - `credentials`: resolves a bearer-token provider (static token, managed
//   identity or an interactive prompt).
// - `pipeline`: request/response types, the transport seam and the
//   pipeline that signs requests.
// - `api`: client options and the `MaestroApi` client owning the pipeline.
// - `subscriptions`: the typed subscription queries.
// - `error`: error taxonomy and failed-response classification.
// - `models`, `serialization`, `time_ago`, `config`: supporting pieces.
// - `ui`: menu and rendering on top of the client.
pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod serialization;
pub mod subscriptions;
pub mod time_ago;
pub mod ui;

pub use api::{MaestroApi, MaestroApiClient, MaestroApiOptions};
pub use credentials::{AppCredentialResolver, AppCredentialResolverOptions, TokenProvider};
pub use error::{MaestroError, RestApiError, Result};
pub use models::{ApiError, Build, Channel, FlowDirection, Subscription};
pub use subscriptions::Subscriptions;
pub use time_ago::humanize_elapsed;
