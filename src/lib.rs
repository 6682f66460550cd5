// Token custody: authenticated encryption and the token vault
pub mod credentials;

// Server-side sessions and their stores
pub mod session;

// OAuth provider client
pub mod oauth;

// Startup configuration
pub mod config;

// HTTP routes and the session gate
pub mod api;
