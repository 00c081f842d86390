pub mod client;

pub use client::{ApiClient, AuthResponse, RegisterRequest};
