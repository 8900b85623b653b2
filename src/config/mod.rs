pub mod schema;

pub use schema::{Config, CredentialsConfig, EndpointsConfig, SessionsConfig, TimeoutsConfig};
