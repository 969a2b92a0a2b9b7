//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → server.rs (host layers: trace, timeout, request id, panic catcher)
//!     → axum_parser.rs (AxumParser implements parser.rs's RequestParser)
//!     → header.rs (RequestHeader, static or dynamic rules)
//!     → pagination.rs (PaginationData for paginated body modes)
//!     → [pipeline phases]
//!     → response.rs (WsResponse envelope, message tables)
//!     → Send to client
//! ```

pub mod axum_parser;
pub mod header;
pub mod pagination;
pub mod parser;
pub mod request;
pub mod response;
pub mod server;

pub use axum_parser::AxumParser;
pub use header::RequestHeader;
pub use pagination::PaginationData;
pub use parser::RequestParser;
pub use response::{ErrorItem, MessageTables, Receipt, ReceiptRow, WsResponse};
pub use server::HttpServer;
