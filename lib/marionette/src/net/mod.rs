pub mod buffer;
pub mod http;
pub mod server;

pub use self::http::{Request, Response};
pub use self::server::HttpServer;
