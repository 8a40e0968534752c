// HTTP API for the smartcart price-comparison service.
// The list/auth services live elsewhere; this surface covers the catalog,
// the comparison engine and the operator feed-import trigger.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
