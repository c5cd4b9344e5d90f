pub mod codes;
pub mod envelope;
pub mod http;
pub mod settings;
pub mod state;

pub use http::router;
pub use settings::ServerSettings;
pub use state::AppState;
